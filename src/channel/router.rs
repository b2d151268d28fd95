//! Per-target mailboxes that turn watch events into pending outcomes.

use crate::error::{ProbeError, Result};
use crate::filter::ExistenceFilter;
use crate::types::{Snapshot, TargetId};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{Delivered, Pending, WatchEvent};

/// Queued deliveries plus at most one waiting receiver.
struct Mailbox<T> {
    queued: VecDeque<Delivered<T>>,
    waiter: Option<Sender<Delivered<T>>>,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            waiter: None,
        }
    }

    /// Hand the value to the waiter, or queue it if nobody is waiting.
    fn deliver(&mut self, delivered: Delivered<T>) {
        let delivered = match self.waiter.take() {
            Some(waiter) => match waiter.try_send(delivered) {
                Ok(()) => return,
                // Waiter went away; keep the value for the next one.
                Err(TrySendError::Full(d)) | Err(TrySendError::Disconnected(d)) => d,
            },
            None => delivered,
        };
        self.queued.push_back(delivered);
    }

    /// Oldest queued value, or a receiver for the next delivery.
    fn wait(&mut self, label: &'static str) -> Pending<T> {
        let (sender, receiver) = bounded(1);
        match self.queued.pop_front() {
            Some(delivered) => {
                // Capacity 1 and a fresh channel: cannot fail.
                let _ = sender.try_send(delivered);
            }
            None => self.waiter = Some(sender),
        }
        Pending::new(label, receiver)
    }
}

/// Internal target state.
struct TargetSlots {
    snapshots: Mailbox<Snapshot>,
    filters: Mailbox<ExistenceFilter>,
}

impl TargetSlots {
    fn new() -> Self {
        Self {
            snapshots: Mailbox::new(),
            filters: Mailbox::new(),
        }
    }
}

/// Routes [`WatchEvent`]s to the outcomes callers are waiting on.
///
/// Events that arrive before anyone waits are queued per target, so a caller
/// can register a target, let the backend answer, and only then ask for the
/// snapshot. Every delivery gets a channel-wide sequence number that records
/// arrival order.
pub struct TargetRouter {
    /// Registered targets by ID.
    targets: RwLock<HashMap<TargetId, TargetSlots>>,
    /// Counter for stamping deliveries.
    next_sequence: AtomicU64,
}

impl TargetRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Start routing events for a target.
    pub fn register(&self, id: TargetId) -> Result<()> {
        let mut targets = self.targets.write();
        if targets.contains_key(&id) {
            return Err(ProbeError::TargetExists(id));
        }
        targets.insert(id, TargetSlots::new());
        Ok(())
    }

    /// Route an event to its target. Events for unknown targets are dropped.
    pub fn dispatch(&self, event: WatchEvent) {
        // Stamp under the lock so sequence order matches delivery order.
        let mut targets = self.targets.write();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);

        match event {
            WatchEvent::Snapshot { target, snapshot } => match targets.get_mut(&target) {
                Some(slots) => slots.snapshots.deliver(Delivered {
                    sequence,
                    value: snapshot,
                }),
                None => debug!(target_id = %target, "dropping snapshot for unknown target"),
            },
            WatchEvent::ExistenceFilter { target, filter } => match targets.get_mut(&target) {
                Some(slots) => slots.filters.deliver(Delivered {
                    sequence,
                    value: filter,
                }),
                None => debug!(target_id = %target, "dropping existence filter for unknown target"),
            },
            WatchEvent::Removed { target, reason } => {
                // Dropping the slots disconnects anyone still waiting.
                if targets.remove(&target).is_some() {
                    debug!(target_id = %target, ?reason, "target removed");
                }
            }
        }
    }

    /// Next full snapshot for a target.
    pub fn snapshot(&self, id: TargetId) -> Result<Pending<Snapshot>> {
        let mut targets = self.targets.write();
        let slots = targets.get_mut(&id).ok_or(ProbeError::UnknownTarget(id))?;
        Ok(slots.snapshots.wait("snapshot"))
    }

    /// Next existence filter for a target.
    pub fn existence_filter(&self, id: TargetId) -> Result<Pending<ExistenceFilter>> {
        let mut targets = self.targets.write();
        let slots = targets.get_mut(&id).ok_or(ProbeError::UnknownTarget(id))?;
        Ok(slots.filters.wait("existence filter"))
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.read().contains_key(&id)
    }

    /// Get target count.
    pub fn target_count(&self) -> usize {
        self.targets.read().len()
    }

    /// Forget every target, disconnecting all waiters.
    pub fn clear(&self) {
        self.targets.write().clear();
    }
}

impl Default for TargetRouter {
    fn default() -> Self {
        Self::new()
    }
}
