//! Integration tests for the resumption probe.

use std::sync::Arc;
use std::time::Duration;
use watch_probe::{
    DocumentStore, FieldFilter, MemoryDatabase, MemorySink, MemoryWatchChannel, ProbeConfig,
    ResumeBehavior, ResumeOutcome, ResumptionProbe, SequentialIds, Snapshot, TargetId,
    TargetSpec, WatchChannel,
};

struct Harness {
    database: Arc<MemoryDatabase>,
    channel: Arc<MemoryWatchChannel>,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new(behavior: ResumeBehavior) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let database = Arc::new(MemoryDatabase::with_ids(Arc::new(SequentialIds::new("doc-"))));
        let channel = Arc::new(MemoryWatchChannel::with_resume_behavior(
            Arc::clone(&database),
            behavior,
        ));
        Self {
            database,
            channel,
            sink: Arc::new(MemorySink::new()),
        }
    }

    fn probe(&self, config: ProbeConfig) -> ResumptionProbe {
        ResumptionProbe::new(self.channel.clone(), self.database.clone(), config)
            .with_ids(Arc::new(SequentialIds::new("run-")))
            .with_log(self.sink.clone())
    }
}

fn quick_config() -> ProbeConfig {
    ProbeConfig {
        settle_delay: Duration::ZERO,
        event_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

// --- Scenarios ---

#[test]
fn test_ten_created_five_deleted() {
    let harness = Harness::new(ResumeBehavior::default());
    let report = harness.probe(quick_config()).run(10, 5, None).unwrap();

    // Initial snapshot is exactly the created set.
    let created: Snapshot = report.created.iter().collect();
    assert_eq!(report.initial_snapshot, created);
    assert_eq!(report.initial_snapshot.len(), 10);

    // The last five by creation order were deleted.
    assert_eq!(report.deleted, report.created[5..].to_vec());

    // Resumed with the pre-deletion count; the backend answered with a filter.
    assert_eq!(report.expected_count, 10);
    assert!(report.filter_observed());

    // Final snapshot converged to the survivors.
    let survivors: Snapshot = report.created[..5].iter().collect();
    assert_eq!(report.final_snapshot, survivors);
}

#[test]
fn test_one_created_one_deleted() {
    let harness = Harness::new(ResumeBehavior::default());
    let report = harness.probe(quick_config()).run(1, 1, None).unwrap();

    assert_eq!(report.initial_snapshot.len(), 1);
    assert!(report.final_snapshot.is_empty());
    // No unchanged documents: the bloom filter is empty but well formed.
    assert_eq!(
        report.resume_outcome,
        ResumeOutcome::ExistenceFilter {
            count: 0,
            bit_length: Some(0),
        }
    );
}

#[test]
fn test_backend_without_filters() {
    let harness = Harness::new(ResumeBehavior::AlwaysSnapshot);
    let report = harness.probe(quick_config()).run(6, 2, None).unwrap();

    assert_eq!(report.resume_outcome, ResumeOutcome::Snapshot);
    assert_eq!(report.final_snapshot.len(), 4);
    assert!(harness.sink.contains("snapshot before any existence filter"));
}

#[test]
fn test_expected_count_override() {
    let harness = Harness::new(ResumeBehavior::default());
    let config = ProbeConfig {
        expected_count: Some(3),
        ..quick_config()
    };

    // The override matches the post-deletion count, so nothing looks stale.
    let report = harness.probe(config).run(5, 2, None).unwrap();

    assert_eq!(report.expected_count, 3);
    assert_eq!(report.resume_outcome, ResumeOutcome::Snapshot);
    assert_eq!(report.final_snapshot.len(), 3);
}

#[test]
fn test_explicit_collection() {
    let harness = Harness::new(ResumeBehavior::default());
    let report = harness
        .probe(quick_config())
        .run(3, 1, Some("shared-collection"))
        .unwrap();

    assert_eq!(report.collection, "shared-collection");
    assert!(report
        .created
        .iter()
        .all(|doc| doc.collection == "shared-collection"));
    assert_eq!(harness.database.document_count("shared-collection"), 2);
}

#[test]
fn test_concurrent_runs_do_not_collide() {
    let harness = Harness::new(ResumeBehavior::default());
    let probe = harness.probe(quick_config());

    let first = probe.run(4, 2, Some("shared")).unwrap();
    let second = probe.run(3, 0, Some("shared")).unwrap();

    assert_ne!(first.run_id, second.run_id);
    // Each run only ever sees its own documents.
    assert_eq!(second.initial_snapshot.len(), 3);
    assert_eq!(second.final_snapshot.len(), 3);
    assert_eq!(harness.database.document_count("shared"), 5);
}

#[test]
fn test_channel_closed_after_success() {
    let harness = Harness::new(ResumeBehavior::default());
    harness.probe(quick_config()).run(2, 1, None).unwrap();

    assert!(!harness.channel.is_open());
    assert_eq!(harness.channel.open_count(), 1);
    assert_eq!(harness.channel.close_count(), 1);
}

#[test]
fn test_log_messages() {
    let harness = Harness::new(ResumeBehavior::default());
    harness.probe(quick_config()).run(10, 5, None).unwrap();

    let lines = harness.sink.lines();
    assert!(lines[0].starts_with("Creating 10 documents"));
    assert!(harness.sink.contains("Deleting 5 of 10 documents"));
    assert!(harness.sink.contains("Resuming target 2 with expected count 10"));
    assert!(harness.sink.contains("existence filter before its snapshot (count 5)"));
    assert!(harness.sink.contains("Existence filter bit length: 50"));
    assert!(lines
        .last()
        .unwrap()
        .starts_with("Target 2 final snapshot: 5 document(s)"));
}

#[test]
fn test_settle_delay_is_honored() {
    let harness = Harness::new(ResumeBehavior::default());
    let config = ProbeConfig {
        settle_delay: Duration::from_millis(50),
        ..quick_config()
    };

    let started = std::time::Instant::now();
    harness.probe(config).run(2, 1, None).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(harness.sink.contains("for the backend to settle"));
}

// --- Channel behavior outside the probe ---

#[test]
fn test_resumed_target_without_deletions() {
    let harness = Harness::new(ResumeBehavior::default());
    let mut fields = watch_probe::Fields::new();
    fields.insert("tag".to_string(), serde_json::json!("x"));
    let created = harness.database.create_documents("c", 2, &fields).unwrap();
    let seen: Snapshot = created.iter().collect();

    let channel = &harness.channel;
    channel.open().unwrap();
    channel
        .add_target(
            TargetSpec::new(TargetId(5), "p", "c", FieldFilter::equals("tag", "x"))
                .resuming(seen.clone(), 2),
        )
        .unwrap();

    let outcome = watch_probe::race(
        channel.existence_filter(TargetId(5)).unwrap(),
        channel.initial_snapshot(TargetId(5)).unwrap(),
        Some(Duration::from_secs(1)),
    )
    .unwrap();

    assert!(!outcome.left_won());
    assert_eq!(outcome.right(), &seen);
    channel.close().unwrap();
}
