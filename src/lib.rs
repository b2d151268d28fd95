//! # Watch Probe
//!
//! A probe for the resumption behavior of document-database watch streams.
//!
//! ## Core Concepts
//!
//! - **Targets**: server-side subscriptions filtering a collection by a field
//!   equality predicate, identified by an integer id
//! - **Snapshots**: the set of documents matching a target at one moment
//! - **Existence filters**: compact bloom-filter hints a backend may send
//!   instead of a full snapshot when a target is resumed
//! - **Resumption probe**: creates documents, snapshots them, deletes some,
//!   resumes the target and reports what the backend answered first
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use watch_probe::{MemoryDatabase, MemoryWatchChannel, ProbeConfig, ResumptionProbe};
//!
//! let database = Arc::new(MemoryDatabase::new());
//! let channel = Arc::new(MemoryWatchChannel::new(database.clone()));
//!
//! let probe = ResumptionProbe::new(channel, database, ProbeConfig::default());
//! let report = probe.run(10, 5, None)?;
//!
//! println!("filter first: {}", report.filter_observed());
//! println!("final snapshot: {}", report.final_snapshot);
//! ```

pub mod channel;
pub mod documents;
pub mod error;
pub mod filter;
pub mod ids;
pub mod log;
pub mod memory;
pub mod probe;
pub mod race;
pub mod retry;
pub mod types;

// Re-exports
pub use channel::{Delivered, Pending, RemoveReason, TargetRouter, WatchChannel, WatchEvent};
pub use documents::DocumentStore;
pub use error::{ProbeError, Result};
pub use filter::{bit_length, BitSequence, BloomFilterPayload, ExistenceFilter};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use log::{LogSink, MemorySink, TracingSink};
pub use memory::{MemoryDatabase, MemoryWatchChannel, ResumeBehavior};
pub use probe::{
    ProbeConfig, ProbeReport, ResumeOutcome, ResumptionProbe, INITIAL_TARGET, RESUMED_TARGET,
};
pub use race::{race, Race};
pub use retry::{retry, AssumeOnline, BackoffPolicy, DelaySelector, NetworkStatus};
pub use types::*;
