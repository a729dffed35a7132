use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::WalConfig;
use crate::error::{Result, WalError};
use crate::log::WriteAheadLog;

struct RegistryInner {
    root: PathBuf,
    config: WalConfig,
    claims: Mutex<HashMap<String, Weak<WriteAheadLog>>>,
    shut_down: AtomicBool,
}

/// Owner of the WAL root directory.
///
/// Each queue gets `root/<name>`; a directory can be claimed by one queue at
/// a time. Cheap to clone; clones share the same claims.
#[derive(Clone)]
pub struct WalRegistry {
    inner: Arc<RegistryInner>,
}

impl WalRegistry {
    /// Create the registry, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>, config: WalConfig) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| WalError::io(&root, err))?;
        debug!(root = %root.display(), "opened WAL registry");
        Ok(Self {
            inner: Arc::new(RegistryInner {
                root,
                config,
                claims: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &WalConfig {
        &self.inner.config
    }

    /// Directory for queue `name`.
    pub fn queue_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.inner.root.join(name))
    }

    /// Claim and open the log for queue `name`.
    pub fn open_log(&self, name: &str) -> Result<WalClaim> {
        let dir = self.queue_dir(name)?;
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(WalError::Closed);
        }

        let mut claims = self.inner.claims.lock();
        if claims
            .get(name)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            return Err(WalError::DirectoryInUse { path: dir });
        }

        let log = Arc::new(WriteAheadLog::open(&dir, self.inner.config)?);
        claims.insert(name.to_string(), Arc::downgrade(&log));
        debug!(queue = name, dir = %dir.display(), "claimed WAL directory");

        Ok(WalClaim {
            registry: self.clone(),
            name: name.to_string(),
            log,
            released: AtomicBool::new(false),
        })
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.inner
            .claims
            .lock()
            .get(name)
            .is_some_and(|log| log.strong_count() > 0)
    }

    /// Names of queue directories present under the root, sorted.
    pub fn queue_names(&self) -> Result<Vec<String>> {
        let root = &self.inner.root;
        let mut names = Vec::new();
        for dirent in fs::read_dir(root).map_err(|err| WalError::io(root, err))? {
            let dirent = dirent.map_err(|err| WalError::io(root, err))?;
            let is_dir = dirent
                .file_type()
                .map_err(|err| WalError::io(dirent.path(), err))?
                .is_dir();
            if let (true, Some(name)) = (is_dir, dirent.file_name().to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Sync and close every claimed log and refuse new claims.
    ///
    /// Returns how many logs were closed. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<usize> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }

        let claims: Vec<_> = self.inner.claims.lock().drain().collect();
        let mut closed = 0;
        let mut first_error = None;
        for (name, log) in claims {
            let Some(log) = log.upgrade() else {
                continue;
            };
            match log.close() {
                Ok(()) => closed += 1,
                Err(err) => {
                    warn!(queue = %name, error = %err, "failed to close WAL during shutdown");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(root = %self.inner.root.display(), closed, "WAL registry shut down");
        match first_error {
            Some(err) => Err(err),
            None => Ok(closed),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    fn release(&self, name: &str, log: &Arc<WriteAheadLog>) {
        let mut claims = self.inner.claims.lock();
        let owned = claims
            .get(name)
            .is_some_and(|claimed| std::ptr::eq(claimed.as_ptr(), Arc::as_ptr(log)));
        if owned {
            claims.remove(name);
            debug!(queue = name, "released WAL directory");
        }
    }
}

impl std::fmt::Debug for WalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalRegistry")
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of one queue directory. Released on drop.
pub struct WalClaim {
    registry: WalRegistry,
    name: String,
    log: Arc<WriteAheadLog>,
    released: AtomicBool,
}

impl WalClaim {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self) -> &WriteAheadLog {
        &self.log
    }

    pub fn registry(&self) -> &WalRegistry {
        &self.registry
    }

    /// Give the directory back to the registry. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.registry.release(&self.name, &self.log);
        }
    }
}

impl Drop for WalClaim {
    fn drop(&mut self) {
        self.release();
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(WalError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "courier-registry-{tag}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn second_claim_is_rejected_until_release() {
        let root = temp_root("claim");
        let registry = WalRegistry::new(&root, WalConfig::default()).unwrap();

        let claim = registry.open_log("orders").unwrap();
        assert!(registry.is_claimed("orders"));
        assert!(matches!(
            registry.open_log("orders"),
            Err(WalError::DirectoryInUse { .. })
        ));

        drop(claim);
        assert!(!registry.is_claimed("orders"));
        let again = registry.open_log("orders").unwrap();
        assert_eq!(again.log().dir(), root.join("orders"));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn names_must_be_single_components() {
        let root = temp_root("names");
        let registry = WalRegistry::new(&root, WalConfig::default()).unwrap();
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                registry.open_log(bad),
                Err(WalError::InvalidName(_))
            ));
        }
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn lists_queue_directories() {
        let root = temp_root("list");
        let registry = WalRegistry::new(&root, WalConfig::default()).unwrap();
        let _b = registry.open_log("beta").unwrap();
        let _a = registry.open_log("alpha").unwrap();
        fs::write(root.join("stray.txt"), b"x").unwrap();

        assert_eq!(registry.queue_names().unwrap(), vec!["alpha", "beta"]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn shutdown_closes_logs_and_refuses_claims() {
        let root = temp_root("shutdown");
        let registry = WalRegistry::new(&root, WalConfig::default()).unwrap();
        let claim = registry.open_log("orders").unwrap();

        assert_eq!(registry.shutdown().unwrap(), 1);
        assert_eq!(registry.shutdown().unwrap(), 0);
        assert!(registry.is_shut_down());
        assert!(matches!(
            claim.log().append(crate::entry::AckWalEntry::new(uuid::Uuid::nil()).to_wal_entry()),
            Err(WalError::Closed)
        ));
        assert!(matches!(
            registry.open_log("other"),
            Err(WalError::Closed)
        ));
        let _ = fs::remove_dir_all(&root);
    }
}
