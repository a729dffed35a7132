use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_frame::{now_millis, Message};
use courier_queue::{Queue, QueueError, QueueKind};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::entry::{AckWalEntry, ConfigWalEntry, MessageWalEntry};
use crate::error::Result;
use crate::log::{CompactionReport, WriteAheadLog};
use crate::registry::{WalClaim, WalRegistry};
use crate::replay::ReplayPlan;

/// Points in the queue protocol where a fault hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// DATA is on disk, the inner queue has not seen the message yet.
    AfterAppend,
    /// The inner queue released the message, its ACK is not on disk yet.
    AfterPoll,
}

pub type FaultHook = Arc<dyn Fn(FaultPoint) + Send + Sync>;

/// What `reload` restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    /// Messages put back into the inner queue.
    pub recovered: usize,
    /// DATA records already acknowledged.
    pub acknowledged: usize,
    /// Unacknowledged messages dropped because they expired.
    pub expired: usize,
    /// Messages a circular queue had already overwritten.
    pub evicted: usize,
    /// Messages the inner queue refused; they are acknowledged so they stay dropped.
    pub rejected: usize,
    /// Torn-tail bytes cut off when the log was opened.
    pub truncated_bytes: u64,
}

struct Durable {
    claim: WalClaim,
    compact_after_acks: Option<u64>,
    acks_since_compaction: AtomicU64,
}

impl Durable {
    fn log(&self) -> &WriteAheadLog {
        self.claim.log()
    }
}

/// Queue decorator that records every offer and poll in a write-ahead log.
///
/// An offer appends DATA before the inner queue sees the message; a poll
/// appends ACK after the inner queue released it. A crash between the two
/// steps redelivers the message on [`WalQueue::reload`] (at-least-once),
/// it never loses or reorders one.
///
/// Temporary or non-durable inner queues get no log; every call delegates.
pub struct WalQueue<Q> {
    inner: Q,
    durable: Option<Durable>,
    fault_hook: Option<FaultHook>,
    offer_order: Mutex<()>,
    removed: AtomicBool,
}

impl<Q: Queue<Message>> WalQueue<Q> {
    /// Wrap `inner`, claiming its directory in `registry` when durable.
    ///
    /// Existing records are not replayed until [`WalQueue::reload`].
    pub fn open(inner: Q, registry: &WalRegistry) -> Result<Self> {
        let durable = if inner.is_temporary() || !inner.is_durable() {
            debug!(queue = inner.name(), "queue is not persistent, WAL disabled");
            None
        } else {
            let claim = registry.open_log(inner.name())?;
            if claim.log().next_lsn() == 0 {
                claim
                    .log()
                    .append(descriptor(&inner).to_wal_entry()?)?;
            }
            Some(Durable {
                claim,
                compact_after_acks: registry.config().compact_after_acks,
                acks_since_compaction: AtomicU64::new(0),
            })
        };

        Ok(Self {
            inner,
            durable,
            fault_hook: None,
            offer_order: Mutex::new(()),
            removed: AtomicBool::new(false),
        })
    }

    /// Run `hook` at each [`FaultPoint`].
    pub fn with_fault_hook(mut self, hook: impl Fn(FaultPoint) + Send + Sync + 'static) -> Self {
        self.fault_hook = Some(Arc::new(hook));
        self
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    pub fn is_wal_enabled(&self) -> bool {
        self.durable.is_some()
    }

    pub fn wal_dir(&self) -> Option<&Path> {
        self.durable.as_ref().map(|durable| durable.log().dir())
    }

    /// Rebuild the inner queue from the log.
    ///
    /// The inner queue is cleared first, so reloading twice yields the same
    /// contents.
    pub fn reload(&self) -> Result<ReloadReport> {
        let Some(durable) = &self.durable else {
            return Ok(ReloadReport::default());
        };
        let _order = self.offer_order.lock();

        self.inner.clear()?;
        let entries = durable.log().entries()?;
        let plan = ReplayPlan::build(entries, now_millis(), self.ring_capacity());
        self.check_descriptor(&plan);

        let mut report = ReloadReport {
            acknowledged: plan.acknowledged,
            expired: plan.expired,
            evicted: plan.evicted,
            truncated_bytes: durable.log().truncated_bytes(),
            ..ReloadReport::default()
        };

        for entry in &plan.live {
            let message = MessageWalEntry::from_wal_entry(entry)?.into_message();
            if self.inner.offer(message)? {
                report.recovered += 1;
            } else {
                report.rejected += 1;
                durable
                    .log()
                    .append(AckWalEntry::new(entry.uuid).to_wal_entry())?;
            }
        }

        info!(
            queue = self.inner.name(),
            recovered = report.recovered,
            acknowledged = report.acknowledged,
            expired = report.expired,
            evicted = report.evicted,
            rejected = report.rejected,
            "reloaded queue from WAL"
        );
        Ok(report)
    }

    /// Drop acknowledged and expired records from the log.
    pub fn compact(&self) -> Result<CompactionReport> {
        match &self.durable {
            Some(durable) => durable.log().compact(self.ring_capacity()),
            None => Ok(CompactionReport::default()),
        }
    }

    fn ring_capacity(&self) -> Option<usize> {
        (self.inner.kind() == QueueKind::Circular).then(|| self.inner.capacity())
    }

    fn check_descriptor(&self, plan: &ReplayPlan) {
        let expected = descriptor(&self.inner);
        let Some(entry) = &plan.config else {
            warn!(queue = self.inner.name(), "WAL has no queue descriptor");
            return;
        };
        match ConfigWalEntry::from_wal_entry(entry) {
            Ok(found) if found == expected => {}
            Ok(found) => warn!(
                queue = self.inner.name(),
                logged_kind = %found.kind,
                logged_capacity = found.capacity,
                kind = %expected.kind,
                capacity = expected.capacity,
                "queue declaration differs from the one in its WAL"
            ),
            Err(err) => warn!(queue = self.inner.name(), error = %err, "unreadable queue descriptor"),
        }
    }

    fn fault(&self, point: FaultPoint) {
        if let Some(hook) = &self.fault_hook {
            hook(point);
        }
    }

    fn acknowledge(&self, durable: &Durable, id: Uuid) -> Result<()> {
        durable
            .log()
            .append(AckWalEntry::new(id).to_wal_entry())?;

        if let Some(threshold) = durable.compact_after_acks {
            let acks = durable.acks_since_compaction.fetch_add(1, Ordering::AcqRel) + 1;
            if acks >= threshold {
                durable.acks_since_compaction.store(0, Ordering::Release);
                durable.log().compact(self.ring_capacity())?;
            }
        }
        Ok(())
    }

    fn ensure_live(&self) -> courier_queue::Result<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(QueueError::Removed(self.inner.name().to_string()));
        }
        Ok(())
    }
}

fn descriptor<Q: Queue<Message>>(queue: &Q) -> ConfigWalEntry {
    ConfigWalEntry {
        name: queue.name().to_string(),
        kind: queue.kind(),
        capacity: queue.capacity(),
    }
}

impl<Q: Queue<Message>> Queue<Message> for WalQueue<Q> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> QueueKind {
        self.inner.kind()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn is_temporary(&self) -> bool {
        self.inner.is_temporary()
    }

    fn is_durable(&self) -> bool {
        self.inner.is_durable()
    }

    fn len(&self) -> courier_queue::Result<usize> {
        self.ensure_live()?;
        self.inner.len()
    }

    fn offer_timeout(&self, message: Message, timeout: Duration) -> courier_queue::Result<bool> {
        self.ensure_live()?;
        let Some(durable) = &self.durable else {
            return self.inner.offer_timeout(message, timeout);
        };

        let id = message.id().unwrap_or_else(Uuid::new_v4);
        let entry = MessageWalEntry::new(message.with_id(id)).map_err(QueueError::storage)?;
        let record = entry.to_wal_entry().map_err(QueueError::storage)?;

        let _order = self.offer_order.lock();
        let lsn = durable.log().append(record).map_err(QueueError::storage)?;
        self.fault(FaultPoint::AfterAppend);

        match self.inner.offer_timeout(entry.into_message(), timeout) {
            Ok(true) => {
                trace!(queue = self.inner.name(), %id, lsn, "offered");
                Ok(true)
            }
            Ok(false) => {
                trace!(queue = self.inner.name(), %id, "inner queue rejected message");
                self.acknowledge(durable, id).map_err(QueueError::storage)?;
                Ok(false)
            }
            Err(err) => {
                if let Err(ack_err) = self.acknowledge(durable, id) {
                    warn!(queue = self.inner.name(), %id, error = %ack_err, "failed to retire rejected message");
                }
                Err(err)
            }
        }
    }

    fn poll_timeout(&self, timeout: Duration) -> courier_queue::Result<Option<Message>> {
        self.ensure_live()?;
        let polled = self.inner.poll_timeout(timeout)?;

        if let (Some(durable), Some(message)) = (&self.durable, &polled) {
            self.fault(FaultPoint::AfterPoll);
            match message.id() {
                Some(id) => {
                    if let Err(err) = self.acknowledge(durable, id) {
                        warn!(
                            queue = self.inner.name(),
                            %id,
                            error = %err,
                            "failed to acknowledge polled message; it will be redelivered on reload"
                        );
                    }
                }
                None => warn!(queue = self.inner.name(), "polled message has no id"),
            }
        }
        Ok(polled)
    }

    fn clear(&self) -> courier_queue::Result<usize> {
        self.ensure_live()?;
        let _order = self.offer_order.lock();
        let dropped = self.inner.clear()?;
        if let Some(durable) = &self.durable {
            let reset = durable.log().reset().and_then(|()| {
                durable
                    .log()
                    .append(descriptor(&self.inner).to_wal_entry()?)
                    .map(|_| ())
            });
            reset.map_err(QueueError::storage)?;
        }
        Ok(dropped)
    }

    fn on_remove(&self) -> courier_queue::Result<()> {
        if self.removed.swap(true, Ordering::AcqRel) {
            return Err(QueueError::Removed(self.inner.name().to_string()));
        }
        if let Some(durable) = &self.durable {
            durable.log().destroy().map_err(QueueError::storage)?;
            durable.claim.release();
        }
        self.inner.on_remove()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use courier_frame::Status;
    use courier_queue::{BoundedQueue, CircularBuffer, QueueConfig};

    use super::*;
    use crate::config::{SyncPolicy, WalConfig};
    use crate::entry::EntryType;
    use crate::error::WalError;

    fn temp_root(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "courier-walqueue-{tag}-{}-{nanos}",
            std::process::id()
        ))
    }

    fn registry(root: &Path) -> WalRegistry {
        WalRegistry::new(
            root,
            WalConfig {
                sync: SyncPolicy::Never,
                ..WalConfig::default()
            },
        )
        .unwrap()
    }

    fn msg(body: &str) -> Message {
        Message::text(Status::Event, "text/plain", "UTF-8", body).unwrap()
    }

    fn bodies<Q: Queue<Message>>(queue: &Q) -> Vec<String> {
        std::iter::from_fn(|| queue.poll().unwrap())
            .map(|m| m.text_payload().unwrap())
            .collect()
    }

    fn bounded(registry: &WalRegistry, capacity: usize) -> WalQueue<BoundedQueue<Message>> {
        WalQueue::open(BoundedQueue::new("orders", capacity), registry).unwrap()
    }

    #[test]
    fn unacked_messages_survive_reopen() {
        let root = temp_root("reopen");
        let registry = registry(&root);
        {
            let queue = bounded(&registry, 8);
            for body in ["a", "b", "c"] {
                assert!(queue.offer(msg(body)).unwrap());
            }
            assert_eq!(queue.poll().unwrap().unwrap().text_payload().unwrap(), "a");
        }

        let queue = bounded(&registry, 8);
        let report = queue.reload().unwrap();
        assert_eq!(report.recovered, 2);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(bodies(&queue), vec!["b", "c"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn reload_is_idempotent() {
        let root = temp_root("idempotent");
        let registry = registry(&root);
        {
            let queue = bounded(&registry, 16);
            for i in 0..5 {
                queue.offer(msg(&format!("m{i}"))).unwrap();
            }
        }

        let queue = bounded(&registry, 16);
        queue.reload().unwrap();
        let second = queue.reload().unwrap();
        assert_eq!(second.recovered, 5);
        assert_eq!(queue.len().unwrap(), 5);
        assert_eq!(bodies(&queue), vec!["m0", "m1", "m2", "m3", "m4"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn compaction_keeps_only_pending_message() {
        let root = temp_root("compact");
        let registry = registry(&root);
        let queue = bounded(&registry, 8);
        for i in 0..5 {
            queue.offer(msg(&format!("m{i}"))).unwrap();
        }
        for _ in 0..4 {
            queue.poll().unwrap().unwrap();
        }

        let report = queue.compact().unwrap();
        assert_eq!(report.entries_before, 1 + 5 + 4);
        assert_eq!(report.entries_after, 2);

        let log = WriteAheadLog::inspect(queue.wal_dir().unwrap()).unwrap();
        let data: Vec<_> = log
            .entries
            .iter()
            .filter(|entry| entry.entry_type == EntryType::Data)
            .collect();
        assert_eq!(data.len(), 1);

        queue.reload().unwrap();
        assert_eq!(bodies(&queue), vec!["m4"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn automatic_compaction_after_acks() {
        let root = temp_root("auto");
        let registry = WalRegistry::new(
            &root,
            WalConfig {
                sync: SyncPolicy::Never,
                compact_after_acks: Some(2),
                ..WalConfig::default()
            },
        )
        .unwrap();
        let queue = bounded(&registry, 8);
        for i in 0..3 {
            queue.offer(msg(&format!("m{i}"))).unwrap();
        }
        queue.poll().unwrap();
        queue.poll().unwrap();

        let log = WriteAheadLog::inspect(queue.wal_dir().unwrap()).unwrap();
        assert_eq!(log.entries.len(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn rejected_offer_is_not_resurrected() {
        let root = temp_root("rejected");
        let registry = registry(&root);
        {
            let queue = bounded(&registry, 1);
            assert!(queue.offer(msg("kept")).unwrap());
            assert!(!queue.offer(msg("rejected")).unwrap());
        }

        let queue = bounded(&registry, 1);
        queue.reload().unwrap();
        assert_eq!(bodies(&queue), vec!["kept"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn circular_reload_matches_ring_contents() {
        let root = temp_root("ring");
        let registry = registry(&root);
        let open = || {
            WalQueue::open(CircularBuffer::new("ring", 3), &registry).unwrap()
        };
        {
            let queue = open();
            for i in 0..5 {
                queue.offer(msg(&i.to_string())).unwrap();
            }
        }

        let queue = open();
        let report = queue.reload().unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(report.recovered, 3);
        assert_eq!(bodies(&queue), vec!["2", "3", "4"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn circular_reload_after_poll_skips_evicted() {
        let root = temp_root("ring-poll");
        let registry = registry(&root);
        let open = || {
            WalQueue::open(CircularBuffer::new("ring", 3), &registry).unwrap()
        };
        {
            let queue = open();
            for i in 0..5 {
                queue.offer(msg(&i.to_string())).unwrap();
            }
            assert_eq!(queue.poll().unwrap().unwrap().text_payload().unwrap(), "2");
        }

        let queue = open();
        let report = queue.reload().unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.recovered, 2);
        assert_eq!(bodies(&queue), vec!["3", "4"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn circular_compaction_after_poll_drops_evicted() {
        let root = temp_root("ring-compact");
        let registry = registry(&root);
        let open = || {
            WalQueue::open(CircularBuffer::new("ring", 3), &registry).unwrap()
        };
        {
            let queue = open();
            for i in 0..5 {
                queue.offer(msg(&i.to_string())).unwrap();
            }
            queue.poll().unwrap().unwrap();
            let report = queue.compact().unwrap();
            assert_eq!(report.entries_before, 1 + 5 + 1);
            assert_eq!(report.entries_after, 1 + 2);
        }

        let queue = open();
        let report = queue.reload().unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(bodies(&queue), vec!["3", "4"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn expired_messages_are_dropped_on_reload() {
        let root = temp_root("expired");
        let registry = registry(&root);
        {
            let queue = bounded(&registry, 4);
            queue.offer(msg("stale").with_expiry(1)).unwrap();
            queue.offer(msg("fresh")).unwrap();
        }

        let queue = bounded(&registry, 4);
        let report = queue.reload().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(bodies(&queue), vec!["fresh"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn clear_resets_the_log() {
        let root = temp_root("clear");
        let registry = registry(&root);
        {
            let queue = bounded(&registry, 4);
            queue.offer(msg("a")).unwrap();
            queue.offer(msg("b")).unwrap();
            assert_eq!(queue.clear().unwrap(), 2);
        }

        let queue = bounded(&registry, 4);
        assert_eq!(queue.reload().unwrap().recovered, 0);
        assert!(queue.is_empty().unwrap());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn offered_messages_get_ids() {
        let root = temp_root("ids");
        let registry = registry(&root);
        let queue = bounded(&registry, 2);
        let id = Uuid::new_v4();

        queue.offer(msg("fresh")).unwrap();
        queue.offer(msg("tagged").with_id(id)).unwrap();
        assert!(queue.poll().unwrap().unwrap().id().is_some());
        assert_eq!(queue.poll().unwrap().unwrap().id(), Some(id));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn temporary_queue_has_no_log() {
        let root = temp_root("temporary");
        let registry = registry(&root);
        let config = QueueConfig::new("scratch", QueueKind::Bounded, 2).temporary(true);
        let queue = WalQueue::open(BoundedQueue::with_config(&config), &registry).unwrap();

        assert!(!queue.is_wal_enabled());
        queue.offer(msg("x")).unwrap();
        assert_eq!(queue.reload().unwrap(), ReloadReport::default());
        assert!(!root.join("scratch").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn remove_deletes_directory_and_releases_claim() {
        let root = temp_root("remove");
        let registry = registry(&root);
        let queue = bounded(&registry, 2);
        queue.offer(msg("x")).unwrap();
        let dir = queue.wal_dir().unwrap().to_path_buf();

        queue.on_remove().unwrap();
        assert!(!dir.exists());
        assert!(!registry.is_claimed("orders"));
        assert!(matches!(queue.on_remove(), Err(QueueError::Removed(_))));
        assert!(matches!(queue.offer(msg("y")), Err(QueueError::Removed(_))));

        let again = bounded(&registry, 2);
        assert_eq!(again.reload().unwrap().recovered, 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn same_queue_cannot_be_opened_twice() {
        let root = temp_root("twice");
        let registry = registry(&root);
        let _first = bounded(&registry, 2);
        let second = WalQueue::open(BoundedQueue::new("orders", 2), &registry);
        assert!(matches!(second, Err(WalError::DirectoryInUse { .. })));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fault_hook_sees_both_points() {
        let root = temp_root("hook");
        let registry = registry(&root);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = {
            let seen = Arc::clone(&seen);
            bounded(&registry, 2).with_fault_hook(move |point| seen.lock().push(point))
        };

        queue.offer(msg("x")).unwrap();
        queue.poll().unwrap();
        assert_eq!(
            *seen.lock(),
            vec![FaultPoint::AfterAppend, FaultPoint::AfterPoll]
        );
        let _ = std::fs::remove_dir_all(&root);
    }
}
