//! Segment files.
//!
//! A log directory holds files named `{first_lsn:020}.wal`. The name is a
//! lower bound of the LSNs inside; lexical order equals LSN order.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncPolicy;
use crate::entry::{Decoded, WalEntry};
use crate::error::{Result, WalError};

pub(crate) const SEGMENT_EXTENSION: &str = "wal";
pub(crate) const COMPACT_TMP_NAME: &str = "compact.tmp";

pub(crate) fn segment_file_name(first_lsn: i64) -> String {
    format!("{first_lsn:020}.{SEGMENT_EXTENSION}")
}

/// A segment file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub first_lsn: i64,
    pub path: PathBuf,
    pub len: u64,
}

/// List segment files in `dir`, oldest first.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<SegmentInfo>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(WalError::io(dir, err)),
    };

    let mut segments = Vec::new();
    for dirent in read_dir {
        let dirent = dirent.map_err(|err| WalError::io(dir, err))?;
        let path = dirent.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SEGMENT_EXTENSION) {
            continue;
        }
        let Some(first_lsn) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<i64>().ok())
        else {
            continue;
        };
        let len = dirent
            .metadata()
            .map_err(|err| WalError::io(&path, err))?
            .len();
        segments.push(SegmentInfo {
            first_lsn,
            path,
            len,
        });
    }
    segments.sort_by_key(|segment| segment.first_lsn);
    Ok(segments)
}

/// Result of decoding one segment file.
pub(crate) struct SegmentScan {
    pub entries: Vec<WalEntry>,
    /// Length of the prefix made of complete, valid records.
    pub valid_len: u64,
    pub file_len: u64,
    /// Why decoding stopped before the end of the file.
    pub defect: Option<String>,
}

pub(crate) fn scan_segment(path: &Path) -> Result<SegmentScan> {
    let bytes = fs::read(path).map_err(|err| WalError::io(path, err))?;
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut defect = None;
    let mut last_lsn: Option<i64> = None;

    while offset < bytes.len() {
        match WalEntry::decode(&bytes[offset..]) {
            Decoded::Entry(entry, used) => {
                if last_lsn.is_some_and(|last| entry.lsn <= last) {
                    defect = Some(format!("lsn {} does not increase", entry.lsn));
                    break;
                }
                last_lsn = Some(entry.lsn);
                entries.push(entry);
                offset += used;
            }
            Decoded::Incomplete => {
                defect = Some(format!("incomplete record ({} bytes)", bytes.len() - offset));
                break;
            }
            Decoded::Invalid(reason) => {
                defect = Some(reason);
                break;
            }
        }
    }

    Ok(SegmentScan {
        entries,
        valid_len: offset as u64,
        file_len: bytes.len() as u64,
        defect,
    })
}

/// Cut a segment back to its valid prefix.
pub(crate) fn truncate_segment(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|err| WalError::io(path, err))?;
    file.set_len(len).map_err(|err| WalError::io(path, err))?;
    file.sync_all().map_err(|err| WalError::io(path, err))
}

/// Make directory entries (creates, renames, removals) durable.
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .map_err(|err| WalError::io(dir, err))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// The segment currently receiving appends.
pub(crate) struct ActiveSegment {
    path: PathBuf,
    file: File,
    len: u64,
    /// A failed write could not be cut back; the file ends in garbage.
    poisoned: bool,
}

impl ActiveSegment {
    pub(crate) fn create(dir: &Path, first_lsn: i64) -> Result<Self> {
        let path = dir.join(segment_file_name(first_lsn));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| WalError::io(&path, err))?;
        let len = file
            .metadata()
            .map_err(|err| WalError::io(&path, err))?
            .len();
        sync_dir(dir)?;
        Ok(Self {
            path,
            file,
            len,
            poisoned: false,
        })
    }

    pub(crate) fn open(info: &SegmentInfo) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .open(&info.path)
            .map_err(|err| WalError::io(&info.path, err))?;
        let len = file
            .metadata()
            .map_err(|err| WalError::io(&info.path, err))?
            .len();
        Ok(Self {
            path: info.path.clone(),
            file,
            len,
            poisoned: false,
        })
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn append(&mut self, record: &[u8], sync: SyncPolicy) -> Result<()> {
        self.append_with(record, sync, |file, record| file.write_all(record))
    }

    /// Write `record` with `write`. If the write fails, whatever part of the
    /// record reached the file is cut off again so later records follow the
    /// last complete one.
    fn append_with<F>(&mut self, record: &[u8], sync: SyncPolicy, write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if self.poisoned {
            return Err(WalError::Closed);
        }
        if let Err(err) = write(&mut self.file, record) {
            if self.file.set_len(self.len).is_err() {
                self.poisoned = true;
            }
            return Err(WalError::io(&self.path, err));
        }
        self.len += record.len() as u64;
        if sync == SyncPolicy::Always {
            self.sync()?;
        }
        Ok(())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|err| WalError::io(&self.path, err))
    }
}
