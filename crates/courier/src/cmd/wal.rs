use std::path::Path;

use courier_frame::now_millis;
use courier_queue::QueueKind;
use courier_wal::{
    CompactionReport, ConfigWalEntry, EntryType, ReplayPlan, WalConfig, WalEntry, WriteAheadLog,
};
use serde::Serialize;

use crate::cmd::WalArgs;
use crate::exit::{wal_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_report, OutputFormat};

#[derive(Serialize)]
struct SegmentOutput {
    file: String,
    first_lsn: i64,
    bytes: u64,
}

#[derive(Serialize)]
struct InspectOutput {
    dir: String,
    queue: Option<ConfigWalEntry>,
    segments: Vec<SegmentOutput>,
    records: usize,
    data_records: usize,
    ack_records: usize,
    config_records: usize,
    first_lsn: Option<i64>,
    last_lsn: Option<i64>,
    live: usize,
    acknowledged: usize,
    expired: usize,
    evicted: usize,
    orphan_acks: usize,
    torn_tail_bytes: u64,
}

#[derive(Serialize)]
struct CompactOutput {
    dir: String,
    ring_capacity: Option<usize>,
    records_before: usize,
    records_after: usize,
    segments_before: usize,
    bytes_before: u64,
    bytes_after: u64,
}

pub fn inspect(args: WalArgs, format: OutputFormat) -> CliResult<i32> {
    require_dir(&args.dir)?;
    let contents =
        WriteAheadLog::inspect(&args.dir).map_err(|err| wal_error("inspect failed", err))?;

    let count = |kind: EntryType| {
        contents
            .entries
            .iter()
            .filter(|entry| entry.entry_type == kind)
            .count()
    };
    let queue = queue_descriptor(&contents.entries)?;
    let plan = ReplayPlan::build(
        contents.entries.clone(),
        now_millis(),
        ring_capacity(queue.as_ref()),
    );

    let out = InspectOutput {
        dir: args.dir.display().to_string(),
        queue,
        segments: contents
            .segments
            .iter()
            .map(|segment| SegmentOutput {
                file: segment
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                first_lsn: segment.first_lsn,
                bytes: segment.len,
            })
            .collect(),
        records: contents.entries.len(),
        data_records: count(EntryType::Data),
        ack_records: count(EntryType::Ack),
        config_records: count(EntryType::Config),
        first_lsn: contents.entries.first().map(|entry| entry.lsn),
        last_lsn: contents.entries.last().map(|entry| entry.lsn),
        live: plan.live.len(),
        acknowledged: plan.acknowledged,
        expired: plan.expired,
        evicted: plan.evicted,
        orphan_acks: plan.orphan_acks,
        torn_tail_bytes: contents.torn_tail_bytes,
    };

    let queue_row = out
        .queue
        .as_ref()
        .map(|q| format!("{} ({}, capacity {})", q.name, q.kind, q.capacity))
        .unwrap_or_else(|| "-".to_string());
    let rows = [
        ("dir", out.dir.clone()),
        ("queue", queue_row),
        ("segments", out.segments.len().to_string()),
        ("records", out.records.to_string()),
        (
            "data / ack / config",
            format!(
                "{} / {} / {}",
                out.data_records, out.ack_records, out.config_records
            ),
        ),
        ("live", out.live.to_string()),
        ("acknowledged", out.acknowledged.to_string()),
        ("expired", out.expired.to_string()),
        ("evicted", out.evicted.to_string()),
        ("orphan acks", out.orphan_acks.to_string()),
        ("torn tail bytes", out.torn_tail_bytes.to_string()),
    ];
    print_report(&out, &rows, format);
    Ok(SUCCESS)
}

/// Compacts in place. The queue owning `dir` must not be running.
pub fn compact(args: WalArgs, format: OutputFormat) -> CliResult<i32> {
    require_dir(&args.dir)?;
    let log = WriteAheadLog::open(&args.dir, WalConfig::default())
        .map_err(|err| wal_error("open failed", err))?;
    let entries = log
        .entries()
        .map_err(|err| wal_error("read failed", err))?;
    let ring_capacity = ring_capacity(queue_descriptor(&entries)?.as_ref());

    let report = log
        .compact(ring_capacity)
        .map_err(|err| wal_error("compaction failed", err))?;
    log.close().map_err(|err| wal_error("close failed", err))?;

    let out = compact_output(&args.dir, ring_capacity, &report);
    let rows = [
        ("dir", out.dir.clone()),
        (
            "records",
            format!("{} -> {}", out.records_before, out.records_after),
        ),
        ("segments before", out.segments_before.to_string()),
        (
            "bytes",
            format!("{} -> {}", out.bytes_before, out.bytes_after),
        ),
    ];
    print_report(&out, &rows, format);
    Ok(SUCCESS)
}

fn compact_output(
    dir: &Path,
    ring_capacity: Option<usize>,
    report: &CompactionReport,
) -> CompactOutput {
    CompactOutput {
        dir: dir.display().to_string(),
        ring_capacity,
        records_before: report.entries_before,
        records_after: report.entries_after,
        segments_before: report.segments_before,
        bytes_before: report.bytes_before,
        bytes_after: report.bytes_after,
    }
}

fn require_dir(dir: &Path) -> CliResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(CliError::new(
            FAILURE,
            format!("{} is not a WAL directory", dir.display()),
        ))
    }
}

fn ring_capacity(queue: Option<&ConfigWalEntry>) -> Option<usize> {
    queue
        .filter(|queue| queue.kind == QueueKind::Circular)
        .map(|queue| queue.capacity)
}

fn queue_descriptor(entries: &[WalEntry]) -> CliResult<Option<ConfigWalEntry>> {
    entries
        .iter()
        .rev()
        .find(|entry| entry.entry_type == EntryType::Config)
        .map(ConfigWalEntry::from_wal_entry)
        .transpose()
        .map_err(|err| wal_error("bad queue descriptor", err))
}
