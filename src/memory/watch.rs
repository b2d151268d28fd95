//! In-memory watch channel over a [`MemoryDatabase`].

use crate::channel::{Pending, RemoveReason, TargetRouter, WatchChannel, WatchEvent};
use crate::error::{ProbeError, Result};
use crate::filter::{BitSequence, BloomFilterPayload, ExistenceFilter};
use crate::types::{DocumentId, Resume, Snapshot, TargetId, TargetSpec};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::database::MemoryDatabase;

/// How a resumed target is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeBehavior {
    /// Send an existence filter before the snapshot whenever the expected
    /// count differs from the current number of matches.
    FilterOnMismatch {
        /// Bloom filter bits per unchanged document.
        bits_per_document: u32,
        /// Number of hash functions.
        hash_count: u32,
    },
    /// Always answer with a full snapshot only.
    AlwaysSnapshot,
}

impl Default for ResumeBehavior {
    fn default() -> Self {
        ResumeBehavior::FilterOnMismatch {
            bits_per_document: 10,
            hash_count: 7,
        }
    }
}

/// A watch channel answering targets straight from a [`MemoryDatabase`].
///
/// Adding a target answers it immediately: a snapshot of the current
/// matches, preceded by an existence filter when a resumed target's expected
/// count is stale. Later document changes are not streamed.
pub struct MemoryWatchChannel {
    database: Arc<MemoryDatabase>,
    router: TargetRouter,
    resume: ResumeBehavior,
    open: AtomicBool,
    /// Upcoming `open` calls that should fail.
    failing_opens: AtomicU32,
    opens: AtomicU32,
    closes: AtomicU32,
}

impl MemoryWatchChannel {
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self::with_resume_behavior(database, ResumeBehavior::default())
    }

    pub fn with_resume_behavior(database: Arc<MemoryDatabase>, resume: ResumeBehavior) -> Self {
        Self {
            database,
            router: TargetRouter::new(),
            resume,
            open: AtomicBool::new(false),
            failing_opens: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        }
    }

    /// Make the next `count` calls to `open` fail with a channel error.
    pub fn fail_next_opens(&self, count: u32) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Successful `open` calls so far.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// `close` calls that actually closed an open channel.
    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ProbeError::ChannelClosed)
        }
    }

    /// Existence filter to send ahead of the snapshot, if any.
    fn existence_filter_for(
        &self,
        spec: &TargetSpec,
        resume: &Resume,
        current: &Snapshot,
    ) -> Option<ExistenceFilter> {
        let ResumeBehavior::FilterOnMismatch {
            bits_per_document,
            hash_count,
        } = self.resume
        else {
            return None;
        };

        if resume.expected_count == current.len() {
            return None;
        }

        let names: Vec<String> = resume
            .from
            .intersection(current)
            .ids()
            .map(|id| document_name(&spec.project, &spec.collection, id))
            .collect();

        Some(ExistenceFilter {
            count: u32::try_from(current.len()).unwrap_or(u32::MAX),
            unchanged_names: Some(encode_names(&names, bits_per_document, hash_count)),
        })
    }
}

impl WatchChannel for MemoryWatchChannel {
    fn open(&self) -> Result<()> {
        let fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(ProbeError::Channel("connection refused".to_string()));
        }

        self.open.store(true, Ordering::SeqCst);
        self.opens.fetch_add(1, Ordering::SeqCst);
        debug!("memory watch channel opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.router.clear();
            self.closes.fetch_add(1, Ordering::SeqCst);
            debug!("memory watch channel closed");
        }
        Ok(())
    }

    fn add_target(&self, spec: TargetSpec) -> Result<()> {
        self.ensure_open()?;
        self.router.register(spec.id)?;

        let current = self.database.matching(&spec.collection, &spec.filter);

        if let Some(resume) = &spec.resume {
            if let Some(filter) = self.existence_filter_for(&spec, resume, &current) {
                debug!(target_id = %spec.id, count = filter.count, "sending existence filter");
                self.router.dispatch(WatchEvent::ExistenceFilter {
                    target: spec.id,
                    filter,
                });
            }
        }

        debug!(target_id = %spec.id, documents = current.len(), "sending snapshot");
        self.router.dispatch(WatchEvent::Snapshot {
            target: spec.id,
            snapshot: current,
        });
        Ok(())
    }

    fn remove_target(&self, id: TargetId) -> Result<()> {
        self.ensure_open()?;
        if !self.router.contains(id) {
            return Err(ProbeError::UnknownTarget(id));
        }
        self.router.dispatch(WatchEvent::Removed {
            target: id,
            reason: RemoveReason::Unsubscribed,
        });
        Ok(())
    }

    fn initial_snapshot(&self, id: TargetId) -> Result<Pending<Snapshot>> {
        self.ensure_open()?;
        self.router.snapshot(id)
    }

    fn existence_filter(&self, id: TargetId) -> Result<Pending<ExistenceFilter>> {
        self.ensure_open()?;
        self.router.existence_filter(id)
    }
}

/// Fully qualified resource name of a document.
fn document_name(project: &str, collection: &str, id: &DocumentId) -> String {
    format!(
        "projects/{}/databases/(default)/documents/{}/{}",
        project, collection, id
    )
}

/// Encode `names` into a bloom filter bitmap using double hashing over
/// SHA-256 digests.
fn encode_names(names: &[String], bits_per_document: u32, hash_count: u32) -> BloomFilterPayload {
    let bit_count = names.len() as u64 * u64::from(bits_per_document);
    let byte_count = bit_count.div_ceil(8);
    let padding = byte_count * 8 - bit_count;
    let mut bitmap = vec![0u8; byte_count as usize];

    if bit_count > 0 {
        for name in names {
            let digest = Sha256::digest(name.as_bytes());
            let h1 = le_word(&digest[0..8]);
            let h2 = le_word(&digest[8..16]);
            for i in 0..u64::from(hash_count) {
                let bit = h1.wrapping_add(i.wrapping_mul(h2)) % bit_count;
                bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
            }
        }
    }

    BloomFilterPayload {
        bits: Some(BitSequence {
            bitmap,
            padding: padding as i32,
        }),
        hash_count,
    }
}

fn le_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}
