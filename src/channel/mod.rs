//! Watch channel abstraction.
//!
//! A watch channel carries targets: server-side subscriptions that filter a
//! collection by a field equality predicate. This module provides:
//! - The [`WatchChannel`] trait backends implement
//! - [`WatchEvent`], the tagged union of everything a target can produce
//! - [`Pending`] outcomes stamped with arrival order
//! - [`TargetRouter`] to turn a stream of events into pending outcomes
//!
//! # Example
//!
//! ```ignore
//! channel.open()?;
//! channel.add_target(TargetSpec::new(
//!     TargetId(1),
//!     "my-project",
//!     "my-collection",
//!     FieldFilter::equals("run_id", "abc"),
//! ))?;
//!
//! let snapshot = channel.initial_snapshot(TargetId(1))?.wait(None)?;
//! println!("{} documents match", snapshot.len());
//! channel.remove_target(TargetId(1))?;
//! channel.close()?;
//! ```

mod router;
mod types;
mod watch;

pub use router::TargetRouter;
pub use types::{Delivered, Pending, RemoveReason, WatchEvent};
pub use watch::WatchChannel;
