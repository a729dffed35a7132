//! Pairing DATA with ACK records.

use std::collections::{HashMap, VecDeque};

use tracing::warn;
use uuid::Uuid;

use crate::entry::{AckWalEntry, EntryType, WalEntry};

/// Outcome of walking a log in LSN order.
#[derive(Debug, Default)]
pub struct ReplayPlan {
    /// Latest CONFIG record, if any.
    pub config: Option<WalEntry>,
    /// Unacknowledged, unexpired DATA records in LSN order.
    pub live: Vec<WalEntry>,
    /// DATA records matched by an ACK.
    pub acknowledged: usize,
    /// Unacknowledged DATA records past their expiry.
    pub expired: usize,
    /// DATA records a ring of the given capacity had overwritten.
    pub evicted: usize,
    /// ACK records with no pending DATA.
    pub orphan_acks: usize,
}

impl ReplayPlan {
    /// Walk `entries`, which must be in ascending LSN order.
    ///
    /// An ACK settles the oldest pending DATA with the same id, so an id
    /// that is offered again after being polled is replayed correctly.
    ///
    /// With `ring_capacity`, DATA records go through a ring of that size the
    /// way a circular queue holds them: a DATA record pushed onto a full ring
    /// evicts the oldest pending one, and an ACK takes its DATA out of the
    /// ring. An ACK for an evicted record counts as an orphan.
    pub fn build(entries: Vec<WalEntry>, now: u64, ring_capacity: Option<usize>) -> Self {
        let mut plan = ReplayPlan::default();
        let mut slots: Vec<Option<WalEntry>> = Vec::new();
        let mut pending: HashMap<Uuid, VecDeque<usize>> = HashMap::new();
        let mut ring: VecDeque<usize> = VecDeque::new();

        for entry in entries {
            match entry.entry_type {
                EntryType::Data => {
                    let slot = slots.len();
                    pending.entry(entry.uuid).or_default().push_back(slot);
                    slots.push(Some(entry));

                    let Some(capacity) = ring_capacity else {
                        continue;
                    };
                    ring.push_back(slot);
                    while ring.len() > capacity {
                        let Some(oldest) = ring.pop_front() else {
                            break;
                        };
                        if let Some(evicted) = slots[oldest].take() {
                            if let Some(queue) = pending.get_mut(&evicted.uuid) {
                                queue.retain(|&pending_slot| pending_slot != oldest);
                            }
                            plan.evicted += 1;
                        }
                    }
                }
                EntryType::Ack => {
                    let id = match AckWalEntry::from_wal_entry(&entry) {
                        Ok(ack) => ack.id,
                        Err(err) => {
                            warn!(lsn = entry.lsn, error = %err, "skipping malformed ACK record");
                            continue;
                        }
                    };
                    match pending.get_mut(&id).and_then(VecDeque::pop_front) {
                        Some(slot) => {
                            slots[slot] = None;
                            if let Some(pos) = ring.iter().position(|&held| held == slot) {
                                ring.remove(pos);
                            }
                            plan.acknowledged += 1;
                        }
                        None => plan.orphan_acks += 1,
                    }
                }
                EntryType::Config => plan.config = Some(entry),
            }
        }

        for entry in slots.into_iter().flatten() {
            if entry.has_expired_at(now) {
                plan.expired += 1;
            } else {
                plan.live.push(entry);
            }
        }
        plan
    }
}
