//! In-memory backend.
//!
//! [`MemoryDatabase`] implements [`DocumentStore`](crate::DocumentStore) and
//! [`MemoryWatchChannel`] implements [`WatchChannel`](crate::WatchChannel)
//! on top of it, so a probe can run without a live service.

mod database;
mod watch;

pub use database::MemoryDatabase;
pub use watch::{MemoryWatchChannel, ResumeBehavior};
