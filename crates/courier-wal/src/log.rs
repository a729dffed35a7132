use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use courier_frame::now_millis;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::WalConfig;
use crate::entry::{WalEntry, UNASSIGNED_LSN};
use crate::error::{Result, WalError};
use crate::replay::ReplayPlan;
use crate::segment::{
    list_segments, scan_segment, segment_file_name, sync_dir, truncate_segment, ActiveSegment,
    SegmentInfo, COMPACT_TMP_NAME,
};

/// What a compaction pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub entries_before: usize,
    pub entries_after: usize,
    pub segments_before: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Everything read from a log directory.
#[derive(Debug, Default)]
pub struct LogContents {
    pub entries: Vec<WalEntry>,
    pub segments: Vec<SegmentInfo>,
    /// Bytes past the last valid record of the last segment.
    pub torn_tail_bytes: u64,
}

struct LogState {
    active: Option<ActiveSegment>,
    next_lsn: i64,
    closed: bool,
    truncated_bytes: u64,
}

/// Append-only, segmented record log for one queue directory.
///
/// Records get strictly increasing LSNs. Opening the log repairs a torn
/// tail left by a crash; any other decoding failure is [`WalError::Corrupt`].
pub struct WriteAheadLog {
    dir: PathBuf,
    config: WalConfig,
    state: Mutex<LogState>,
}

impl WriteAheadLog {
    /// Open (creating if needed) the log in `dir`.
    pub fn open(dir: impl Into<PathBuf>, config: WalConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| WalError::io(&dir, err))?;
        remove_stale_tmp(&dir)?;

        let contents = read_dir_contents(&dir, true)?;
        let next_lsn = contents
            .entries
            .last()
            .map(|entry| entry.lsn + 1)
            .or_else(|| contents.segments.last().map(|segment| segment.first_lsn))
            .unwrap_or(0);

        let active = match contents.segments.last() {
            Some(last) if last.len < config.max_segment_bytes => {
                Some(ActiveSegment::open(last)?)
            }
            _ => None,
        };

        if contents.torn_tail_bytes > 0 {
            info!(
                dir = %dir.display(),
                truncated_bytes = contents.torn_tail_bytes,
                "recovered WAL with torn tail"
            );
        }
        debug!(
            dir = %dir.display(),
            segments = contents.segments.len(),
            entries = contents.entries.len(),
            next_lsn,
            "opened WAL"
        );

        Ok(Self {
            dir,
            config,
            state: Mutex::new(LogState {
                active,
                next_lsn,
                closed: false,
                truncated_bytes: contents.torn_tail_bytes,
            }),
        })
    }

    /// Read a log directory without modifying it.
    pub fn inspect(dir: impl AsRef<Path>) -> Result<LogContents> {
        read_dir_contents(dir.as_ref(), false)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// LSN the next append will receive.
    pub fn next_lsn(&self) -> i64 {
        self.state.lock().next_lsn
    }

    /// Bytes cut from a torn tail when the log was opened.
    pub fn truncated_bytes(&self) -> u64 {
        self.state.lock().truncated_bytes
    }

    /// Append `entry` and return its LSN.
    pub fn append(&self, mut entry: WalEntry) -> Result<i64> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WalError::Closed);
        }

        entry.lsn = state.next_lsn;
        let mut record = BytesMut::with_capacity(entry.encoded_len());
        entry.encode(&mut record);

        let roll = state
            .active
            .as_ref()
            .is_none_or(|active| active.len() >= self.config.max_segment_bytes);
        if roll {
            state.active = Some(ActiveSegment::create(&self.dir, entry.lsn)?);
            debug!(dir = %self.dir.display(), first_lsn = entry.lsn, "started WAL segment");
        }
        if let Some(active) = state.active.as_mut() {
            if let Err(err) = active.append(&record, self.config.sync) {
                if active.is_poisoned() {
                    state.closed = true;
                    error!(
                        dir = %self.dir.display(),
                        error = %err,
                        "partial record could not be removed; WAL closed"
                    );
                }
                return Err(err);
            }
        }

        state.next_lsn += 1;
        Ok(entry.lsn)
    }

    /// All records in LSN order.
    pub fn entries(&self) -> Result<Vec<WalEntry>> {
        let state = self.state.lock();
        if state.closed {
            return Err(WalError::Closed);
        }
        Ok(read_dir_contents(&self.dir, false)?.entries)
    }

    /// Delete every record. LSNs keep increasing across a reset.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WalError::Closed);
        }
        state.active = None;
        for segment in list_segments(&self.dir)? {
            fs::remove_file(&segment.path).map_err(|err| WalError::io(&segment.path, err))?;
        }
        sync_dir(&self.dir)?;
        debug!(dir = %self.dir.display(), "reset WAL");
        Ok(())
    }

    /// Rewrite the log keeping the CONFIG record and unacknowledged,
    /// unexpired DATA records. With `ring_capacity`, DATA records a ring of
    /// that size had already evicted are dropped as well.
    pub fn compact(&self, ring_capacity: Option<usize>) -> Result<CompactionReport> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WalError::Closed);
        }

        let contents = read_dir_contents(&self.dir, false)?;
        let Some(first) = contents.segments.first() else {
            return Ok(CompactionReport::default());
        };
        let target = self.dir.join(segment_file_name(first.first_lsn));

        let mut report = CompactionReport {
            entries_before: contents.entries.len(),
            segments_before: contents.segments.len(),
            bytes_before: contents.segments.iter().map(|segment| segment.len).sum(),
            ..CompactionReport::default()
        };

        let plan = ReplayPlan::build(contents.entries, now_millis(), ring_capacity);
        let mut survivors: Vec<WalEntry> = plan.config.into_iter().chain(plan.live).collect();
        survivors.sort_by_key(|entry| entry.lsn);

        let mut buf = BytesMut::new();
        for entry in &survivors {
            entry.encode(&mut buf);
        }

        let tmp = self.dir.join(COMPACT_TMP_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|err| WalError::io(&tmp, err))?;
        file.write_all(&buf).map_err(|err| WalError::io(&tmp, err))?;
        file.sync_all().map_err(|err| WalError::io(&tmp, err))?;
        drop(file);

        state.active = None;
        fs::rename(&tmp, &target).map_err(|err| WalError::io(&target, err))?;
        for segment in &contents.segments {
            if segment.path != target {
                fs::remove_file(&segment.path).map_err(|err| WalError::io(&segment.path, err))?;
            }
        }
        sync_dir(&self.dir)?;

        report.entries_after = survivors.len();
        report.bytes_after = buf.len() as u64;
        if report.bytes_after < self.config.max_segment_bytes {
            state.active = Some(ActiveSegment::open(&SegmentInfo {
                first_lsn: first.first_lsn,
                path: target,
                len: report.bytes_after,
            })?);
        }

        info!(
            dir = %self.dir.display(),
            entries_before = report.entries_before,
            entries_after = report.entries_after,
            "compacted WAL"
        );
        Ok(report)
    }

    /// Force appended records to stable storage.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.lock();
        match state.active.as_ref() {
            Some(active) => active.sync(),
            None => Ok(()),
        }
    }

    /// Sync and refuse further use. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        if let Some(active) = state.active.take() {
            active.sync()?;
        }
        state.closed = true;
        Ok(())
    }

    /// Close the log and delete its directory.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.active = None;
        state.closed = true;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(WalError::io(&self.dir, err)),
        }
        debug!(dir = %self.dir.display(), "deleted WAL directory");
        Ok(())
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn remove_stale_tmp(dir: &Path) -> Result<()> {
    let tmp = dir.join(COMPACT_TMP_NAME);
    match fs::remove_file(&tmp) {
        Ok(()) => {
            warn!(path = %tmp.display(), "removed leftover compaction file");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WalError::io(&tmp, err)),
    }
}

/// Read every segment in order.
///
/// A defect in the last segment is a torn tail: with `repair` the file is
/// truncated to its valid prefix, otherwise the bytes are only counted. A
/// defect anywhere else is corruption. Records whose LSN does not exceed
/// one already read come from an interrupted compaction and are skipped.
fn read_dir_contents(dir: &Path, repair: bool) -> Result<LogContents> {
    let mut segments = list_segments(dir)?;
    let mut contents = LogContents::default();
    let mut last_lsn = UNASSIGNED_LSN;
    let count = segments.len();

    for (index, segment) in segments.iter_mut().enumerate() {
        let scan = scan_segment(&segment.path)?;
        if let Some(defect) = scan.defect {
            if index + 1 < count {
                return Err(WalError::Corrupt {
                    path: segment.path.clone(),
                    offset: scan.valid_len,
                    reason: defect,
                });
            }
            let torn = scan.file_len - scan.valid_len;
            warn!(
                path = %segment.path.display(),
                offset = scan.valid_len,
                torn_bytes = torn,
                reason = %defect,
                "discarding torn WAL tail"
            );
            if repair {
                truncate_segment(&segment.path, scan.valid_len)?;
                segment.len = scan.valid_len;
            }
            contents.torn_tail_bytes = torn;
        }

        let mut skipped = 0usize;
        for entry in scan.entries {
            if entry.lsn <= last_lsn {
                skipped += 1;
                continue;
            }
            last_lsn = entry.lsn;
            contents.entries.push(entry);
        }
        if skipped > 0 {
            warn!(
                path = %segment.path.display(),
                skipped,
                "skipped records already present in an earlier segment"
            );
        }
    }

    contents.segments = segments;
    Ok(contents)
}
