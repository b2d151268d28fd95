//! The watch channel collaborator.

use crate::error::Result;
use crate::filter::ExistenceFilter;
use crate::types::{Snapshot, TargetId, TargetSpec};

use super::types::Pending;

/// A connection to a backend's watch stream.
///
/// Targets are registered by id. Each target eventually yields full
/// snapshots and, when resumed, possibly an existence filter first.
/// Implementations typically feed backend events through a
/// [`TargetRouter`](super::TargetRouter).
pub trait WatchChannel: Send + Sync {
    /// Connect to the backend.
    fn open(&self) -> Result<()>;

    /// Disconnect. Closing a channel that is not open is a no-op.
    fn close(&self) -> Result<()>;

    /// Register a target.
    fn add_target(&self, spec: TargetSpec) -> Result<()>;

    /// Deregister a target.
    fn remove_target(&self, id: TargetId) -> Result<()>;

    /// Next full snapshot of a target.
    fn initial_snapshot(&self, id: TargetId) -> Result<Pending<Snapshot>>;

    /// Next existence filter of a target.
    fn existence_filter(&self, id: TargetId) -> Result<Pending<ExistenceFilter>>;
}
