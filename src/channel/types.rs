//! Event and outcome types for watch channels.

use crate::error::{ProbeError, Result};
use crate::filter::ExistenceFilter;
use crate::race::{recv_before, timer};
use crate::types::{Snapshot, TargetId};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Events a watch channel produces for its targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// Full set of documents currently matching the target.
    Snapshot {
        target: TargetId,
        snapshot: Snapshot,
    },

    /// Compact existence hint sent instead of (or before) a full snapshot
    /// when a target is resumed.
    ExistenceFilter {
        target: TargetId,
        filter: ExistenceFilter,
    },

    /// The target is gone and will produce no further events.
    Removed {
        target: TargetId,
        reason: RemoveReason,
    },
}

impl WatchEvent {
    /// The target this event belongs to.
    pub fn target(&self) -> TargetId {
        match self {
            WatchEvent::Snapshot { target, .. }
            | WatchEvent::ExistenceFilter { target, .. }
            | WatchEvent::Removed { target, .. } => *target,
        }
    }
}

/// Why a target stopped producing events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    /// The client removed the target.
    Unsubscribed,
    /// The channel was closed.
    ChannelClosed,
    /// The backend rejected the target.
    Rejected(String),
}

/// A value stamped with its arrival order on the channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivered<T> {
    /// Monotonically increasing across every delivery on one channel.
    pub sequence: u64,
    pub value: T,
}

/// One-shot outcome that a watch channel will eventually deliver.
///
/// Dropping the sending side without a value disconnects the outcome.
#[derive(Debug)]
pub struct Pending<T> {
    label: &'static str,
    pub(crate) receiver: Receiver<Delivered<T>>,
}

impl<T> Pending<T> {
    /// Wrap a receiver. `label` names the awaited outcome in errors.
    pub fn new(label: &'static str, receiver: Receiver<Delivered<T>>) -> Self {
        Self { label, receiver }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Block until the outcome arrives.
    pub fn wait(self, timeout: Option<Duration>) -> Result<T> {
        let deadline = timer(timeout);
        recv_before(&self, &deadline, timeout).map(|d| d.value)
    }

    /// Take the outcome if it has already arrived.
    pub fn try_take(&self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(delivered) => Ok(Some(delivered.value)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(ProbeError::Disconnected(self.label.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_event_target() {
        let event = WatchEvent::Removed {
            target: TargetId(4),
            reason: RemoveReason::Unsubscribed,
        };
        assert_eq!(event.target(), TargetId(4));
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = WatchEvent::Snapshot {
            target: TargetId(1),
            snapshot: Snapshot::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["target"], 1);
    }

    #[test]
    fn test_pending_wait() {
        let (tx, rx) = bounded(1);
        let pending = Pending::new("answer", rx);
        assert_eq!(pending.try_take().unwrap(), None);

        tx.send(Delivered {
            sequence: 1,
            value: 42,
        })
        .unwrap();
        assert_eq!(pending.wait(None).unwrap(), 42);
    }

    #[test]
    fn test_pending_disconnected() {
        let (tx, rx) = bounded::<Delivered<u32>>(1);
        drop(tx);
        let pending = Pending::new("answer", rx);
        assert!(matches!(pending.wait(None), Err(ProbeError::Disconnected(what)) if what == "answer"));
    }

    #[test]
    fn test_pending_timeout() {
        let (_tx, rx) = bounded::<Delivered<u32>>(1);
        let pending = Pending::new("answer", rx);
        let result = pending.wait(Some(Duration::from_millis(20)));
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }
}
