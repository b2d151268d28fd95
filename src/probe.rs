//! The resumption probe.
//!
//! A probe run checks how a backend answers a resumed watch target once some
//! of the documents the target saw have been deleted. It goes through five
//! phases:
//!
//! 1. **Populate**: create documents tagged with a fresh run id
//! 2. **Observe**: listen on target 1, check the snapshot is exactly the
//!    created set, stop listening
//! 3. **Mutate**: delete the last documents created
//! 4. **Settle**: wait for the backend to converge
//! 5. **Resume**: listen on target 2 resuming from the target 1 snapshot,
//!    report whether an existence filter or a snapshot arrived first, then
//!    take the final snapshot
//!
//! The watch channel is closed when the run ends, whether it succeeded or
//! not.

use crate::channel::WatchChannel;
use crate::documents::DocumentStore;
use crate::error::{ProbeError, Result};
use crate::filter::ExistenceFilter;
use crate::ids::{IdGenerator, RandomIds};
use crate::log::{LogSink, TracingSink};
use crate::race::race;
use crate::retry::{retry, AssumeOnline, BackoffPolicy, NetworkStatus};
use crate::types::{DocumentRef, FieldFilter, Fields, RunId, Snapshot, TargetId, TargetSpec};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Target used for the first observation.
pub const INITIAL_TARGET: TargetId = TargetId(1);

/// Target used to resume from the first observation.
pub const RESUMED_TARGET: TargetId = TargetId(2);

/// Probe configuration.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Project the targets are registered under.
    pub project_id: String,

    /// Prefix of the generated collection name (followed by the run id).
    pub collection_prefix: String,

    /// Field every document is tagged with; its value is the run id.
    pub filter_field: String,

    /// Pause between deleting documents and resuming the target.
    /// Default: 10s
    pub settle_delay: Duration,

    /// Expected count sent with the resumed target.
    /// Default (None): the size of the first snapshot.
    pub expected_count: Option<usize>,

    /// Bound on every wait for a snapshot or filter (None = wait forever).
    pub event_timeout: Option<Duration>,

    /// Retry policy for opening the watch channel.
    /// Default: a single attempt.
    pub open_retry: BackoffPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            project_id: "watch-probe".to_string(),
            collection_prefix: "probe-".to_string(),
            filter_field: "run_id".to_string(),
            settle_delay: Duration::from_secs(10),
            expected_count: None,
            event_timeout: None,
            open_retry: BackoffPolicy::default(),
        }
    }
}

/// What the resumed target produced first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// An existence filter arrived before the snapshot.
    ExistenceFilter {
        /// Matching document count the filter reported.
        count: u32,
        /// Encoded bloom filter bits, if decodable.
        bit_length: Option<u32>,
    },
    /// The full snapshot arrived first.
    Snapshot,
}

/// Everything a probe run observed.
#[derive(Clone, Debug)]
pub struct ProbeReport {
    pub run_id: RunId,
    pub collection: String,
    /// Created documents, in creation order.
    pub created: Vec<DocumentRef>,
    /// Deleted documents (the tail of `created`).
    pub deleted: Vec<DocumentRef>,
    /// Snapshot of the first target.
    pub initial_snapshot: Snapshot,
    /// Expected count the resumed target was registered with.
    pub expected_count: usize,
    pub resume_outcome: ResumeOutcome,
    /// Snapshot of the resumed target.
    pub final_snapshot: Snapshot,
}

impl ProbeReport {
    /// Whether the backend answered the resume with an existence filter.
    pub fn filter_observed(&self) -> bool {
        matches!(self.resume_outcome, ResumeOutcome::ExistenceFilter { .. })
    }
}

/// Runs the resumption procedure against a watch channel and document store.
pub struct ResumptionProbe {
    channel: Arc<dyn WatchChannel>,
    store: Arc<dyn DocumentStore>,
    config: ProbeConfig,
    ids: Arc<dyn IdGenerator>,
    log: Arc<dyn LogSink>,
    network: Arc<dyn NetworkStatus>,
}

impl ResumptionProbe {
    /// Create a probe with random run ids, logging through `tracing`.
    pub fn new(
        channel: Arc<dyn WatchChannel>,
        store: Arc<dyn DocumentStore>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            channel,
            store,
            config,
            ids: Arc::new(RandomIds),
            log: Arc::new(TracingSink),
            network: Arc::new(AssumeOnline),
        }
    }

    /// Use `ids` to generate run ids.
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Send progress messages to `log`.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Consult `network` when choosing retry delays.
    pub fn with_network_status(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = network;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run the probe.
    ///
    /// Creates `create_count` documents and deletes the last `delete_count`
    /// of them. Documents go to `collection_id`, or to a fresh collection
    /// named after the run id.
    pub fn run(
        &self,
        create_count: usize,
        delete_count: usize,
        collection_id: Option<&str>,
    ) -> Result<ProbeReport> {
        if delete_count > create_count {
            return Err(ProbeError::Config(format!(
                "delete count {} exceeds create count {}",
                delete_count, create_count
            )));
        }

        let run_id = RunId(self.ids.next_id());
        let collection = match collection_id {
            Some(id) => id.to_string(),
            None => format!("{}{}", self.config.collection_prefix, run_id),
        };
        info!(%run_id, %collection, create_count, delete_count, "starting resumption probe");

        let result = self.run_body(run_id, collection, create_count, delete_count);
        let closed = self.channel.close();

        match (result, closed) {
            (Ok(report), Ok(())) => {
                info!(
                    run_id = %report.run_id,
                    filter_observed = report.filter_observed(),
                    "resumption probe finished"
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_error)) => {
                warn!(error = %close_error, "failed to close watch channel after probe failure");
                Err(e)
            }
        }
    }

    fn run_body(
        &self,
        run_id: RunId,
        collection: String,
        create_count: usize,
        delete_count: usize,
    ) -> Result<ProbeReport> {
        retry(
            &self.config.open_retry,
            self.network.as_ref(),
            "open watch channel",
            || self.channel.open(),
        )?;

        let filter = FieldFilter::equals(self.config.filter_field.as_str(), run_id.0.as_str());

        let created = self.populate(&run_id, &collection, create_count)?;
        let initial_snapshot = self.observe(&collection, &filter, &created)?;
        let deleted = self.mutate(&created, delete_count)?;
        self.settle();

        let expected_count = self
            .config
            .expected_count
            .unwrap_or(initial_snapshot.len());
        let (resume_outcome, final_snapshot) =
            self.resume(&collection, &filter, &initial_snapshot, expected_count)?;

        Ok(ProbeReport {
            run_id,
            collection,
            created,
            deleted,
            initial_snapshot,
            expected_count,
            resume_outcome,
            final_snapshot,
        })
    }

    /// Step 1: create `count` documents tagged with the run id.
    fn populate(&self, run_id: &RunId, collection: &str, count: usize) -> Result<Vec<DocumentRef>> {
        self.log(&format!(
            "Creating {} documents in collection {}",
            count, collection
        ));

        let mut fields = Fields::new();
        fields.insert(
            self.config.filter_field.clone(),
            serde_json::Value::String(run_id.0.clone()),
        );

        let created = self.store.create_documents(collection, count, &fields)?;
        if created.len() != count {
            return Err(ProbeError::Store(format!(
                "expected {} documents, store returned {}",
                count,
                created.len()
            )));
        }
        Ok(created)
    }

    /// Step 2: the first snapshot must be exactly the created documents.
    fn observe(
        &self,
        collection: &str,
        filter: &FieldFilter,
        created: &[DocumentRef],
    ) -> Result<Snapshot> {
        self.channel
            .add_target(self.target_spec(INITIAL_TARGET, collection, filter))?;
        let snapshot = self
            .channel
            .initial_snapshot(INITIAL_TARGET)?
            .wait(self.config.event_timeout)?;
        self.log(&format!(
            "Target {} snapshot: {}",
            INITIAL_TARGET, snapshot
        ));

        let expected: Snapshot = created.iter().collect();
        if snapshot != expected {
            return Err(ProbeError::SnapshotMismatch {
                expected,
                actual: snapshot,
            });
        }

        self.channel.remove_target(INITIAL_TARGET)?;
        Ok(snapshot)
    }

    /// Step 3: delete the last `count` created documents.
    fn mutate(&self, created: &[DocumentRef], count: usize) -> Result<Vec<DocumentRef>> {
        let doomed = created[created.len() - count..].to_vec();
        self.log(&format!(
            "Deleting {} of {} documents",
            doomed.len(),
            created.len()
        ));

        if !doomed.is_empty() {
            self.store.delete_documents(&doomed)?;
        }
        Ok(doomed)
    }

    /// Step 4: give the backend time to converge before resuming.
    fn settle(&self) {
        let delay = self.config.settle_delay;
        if delay.is_zero() {
            return;
        }
        self.log(&format!("Waiting {:?} for the backend to settle", delay));
        thread::sleep(delay);
    }

    /// Step 5: resume from `from`, classify the first answer, take the
    /// final snapshot.
    fn resume(
        &self,
        collection: &str,
        filter: &FieldFilter,
        from: &Snapshot,
        expected_count: usize,
    ) -> Result<(ResumeOutcome, Snapshot)> {
        let spec = self
            .target_spec(RESUMED_TARGET, collection, filter)
            .resuming(from.clone(), expected_count);
        self.log(&format!(
            "Resuming target {} with expected count {}",
            RESUMED_TARGET, expected_count
        ));
        self.channel.add_target(spec)?;

        let existence_filter = self.channel.existence_filter(RESUMED_TARGET)?;
        let snapshot = self.channel.initial_snapshot(RESUMED_TARGET)?;
        let (first_filter, final_snapshot) =
            race(existence_filter, snapshot, self.config.event_timeout)?.into_parts();

        let outcome = match first_filter {
            Some(filter) => self.classify_filter(&filter),
            None => {
                self.log(&format!(
                    "Target {} produced a snapshot before any existence filter",
                    RESUMED_TARGET
                ));
                ResumeOutcome::Snapshot
            }
        };

        self.log(&format!(
            "Target {} final snapshot: {}",
            RESUMED_TARGET, final_snapshot
        ));
        Ok((outcome, final_snapshot))
    }

    fn classify_filter(&self, filter: &ExistenceFilter) -> ResumeOutcome {
        self.log(&format!(
            "Target {} produced an existence filter before its snapshot (count {})",
            RESUMED_TARGET, filter.count
        ));

        let bit_length = filter.bit_length();
        match bit_length {
            Some(bits) => self.log(&format!("Existence filter bit length: {}", bits)),
            None => self.log("Existence filter bit length: unknown"),
        }

        if let Some(bits) = filter.unchanged_names.as_ref().and_then(|p| p.bits.as_ref()) {
            debug!(
                bitmap = %bits.bitmap_hex(),
                padding = bits.padding,
                hash_count = ?filter.hash_count(),
                "existence filter bitmap"
            );
        }

        ResumeOutcome::ExistenceFilter {
            count: filter.count,
            bit_length,
        }
    }

    fn target_spec(&self, id: TargetId, collection: &str, filter: &FieldFilter) -> TargetSpec {
        TargetSpec::new(id, &self.config.project_id, collection, filter.clone())
    }

    fn log(&self, message: &str) {
        self.log.log(message);
    }
}
