//! Error types for the watch probe.

use crate::types::{Snapshot, TargetId};
use std::time::Duration;
use thiserror::Error;

/// Main error type for probe and collaborator operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Snapshot mismatch: expected {expected}, got {actual}")]
    SnapshotMismatch { expected: Snapshot, actual: Snapshot },

    #[error("Watch channel is closed")]
    ChannelClosed,

    #[error("Target already exists: {0}")]
    TargetExists(TargetId),

    #[error("Target not found: {0}")]
    UnknownTarget(TargetId),

    #[error("Disconnected while waiting for {0}")]
    Disconnected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Watch channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProbeError {
    fn from(e: serde_json::Error) -> Self {
        ProbeError::Serialization(e.to_string())
    }
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;
