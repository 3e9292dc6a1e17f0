use segmentation_core::{
    event::RunEvent,
    ledger::{IngestReport, RawTransaction, Snapshot},
    report::VenueBreakdowns,
    store::{DOC_DEMOGRAPHICS, DOC_HIGH_SPENDERS, DOC_INGEST, DOC_VENUE_BREAKDOWNS},
    synthetic::{generate, SyntheticSpec},
    types::{Methodology, Scope},
    EngineConfig, SegStore, SegmentationEngine, SegmentationRun,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn store() -> SegStore {
    let store = SegStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn synthetic_run(seed: u64, customers: usize) -> SegmentationRun {
    SegmentationEngine::new(EngineConfig::standard())
        .expect("valid config")
        .run(&generate(&SyntheticSpec::new(seed, customers)))
        .expect("run")
}

fn raw_txn(customer: &str, amount: &str) -> RawTransaction {
    RawTransaction {
        customer_id: customer.into(),
        venue_id: "V".into(),
        amount: amount.into(),
        timestamp: "2024-05-01 12:00:00".into(),
        category: "Home".into(),
        store_id: "V-L01".into(),
        ..RawTransaction::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn classification_rows_round_trip() {
    let store = store();
    let run = synthetic_run(3, 250);
    store.publish_run(&run).expect("publish");

    let rows = store.customer_rows(&run.snapshot_id).expect("rows");
    assert_eq!(rows, run.customers);

    let first = &run.customers[0];
    let stored = store
        .customer_row(&run.snapshot_id, &first.customer_id)
        .expect("query")
        .expect("row present");
    assert_eq!(&stored, first);
    assert!(store
        .customer_row(&run.snapshot_id, "NOT-A-CUSTOMER")
        .expect("query")
        .is_none());
}

#[test]
fn rfv_scores_round_trip_per_scope() {
    let store = store();
    let run = synthetic_run(3, 250);
    store.publish_run(&run).expect("publish");

    let global = store.rfv_scores(&run.snapshot_id, Scope::Global).expect("global");
    assert_eq!(global, run.rfv.global);

    let per_venue = store.rfv_scores(&run.snapshot_id, Scope::PerVenue).expect("per venue");
    let expected: Vec<_> = run.rfv.per_venue.values().flatten().cloned().collect();
    assert_eq!(per_venue, expected);
}

#[test]
fn republishing_replaces_the_previous_run() {
    let store = store();
    let mut big = synthetic_run(4, 300);
    big.snapshot_id = "nightly".into();
    let mut small = synthetic_run(5, 120);
    small.snapshot_id = "nightly".into();

    store.publish_run(&big).expect("first publish");
    store.publish_run(&small).expect("second publish");

    assert!(store.run_exists("nightly").expect("exists"));
    assert_eq!(
        store.count_rows("customer_classification", "nightly").expect("count"),
        small.customers.len(),
        "rows from the replaced run were left behind"
    );
    assert_eq!(
        store.count_rows("rfv_score", "nightly").expect("count"),
        small.rfv.global.len() + small.rfv.per_venue.values().map(Vec::len).sum::<usize>()
    );
}

#[test]
fn failed_publish_leaves_the_previous_run_intact() {
    let store = store();
    let run = synthetic_run(6, 200);
    store.publish_run(&run).expect("publish");

    // A duplicated customer violates the primary key half-way through the write.
    let mut broken = synthetic_run(7, 200);
    broken.snapshot_id = run.snapshot_id.clone();
    let duplicate = broken.customers[0].clone();
    broken.customers.push(duplicate);
    assert!(store.publish_run(&broken).is_err());

    let rows = store.customer_rows(&run.snapshot_id).expect("rows");
    assert_eq!(rows, run.customers, "readers must still see the complete earlier run");
}

#[test]
fn delete_cascades_to_every_table() {
    let store = store();
    let run = synthetic_run(8, 150);
    store.publish_run(&run).expect("publish");

    assert_eq!(store.delete_run(&run.snapshot_id).expect("delete"), 1);
    assert!(!store.run_exists(&run.snapshot_id).expect("exists"));
    for table in [
        "customer_classification",
        "rfv_score",
        "venue_summary",
        "profile_summary",
        "profile_venue",
        "persona_summary",
        "report_document",
        "event_log",
    ] {
        assert_eq!(store.count_rows(table, &run.snapshot_id).expect("count"), 0, "{table}");
    }
    assert!(store.count_rows("sqlite_master", &run.snapshot_id).is_err());
}

#[test]
fn summaries_and_documents_are_persisted() {
    let store = store();
    let run = synthetic_run(9, 400);
    store.publish_run(&run).expect("publish");

    assert_eq!(store.venue_summaries(&run.snapshot_id).expect("venues"), run.reports.venues);

    let personas = store.persona_counts(&run.snapshot_id).expect("personas");
    let expected: Vec<_> = run.reports.personas.iter().map(|p| (p.persona, p.customers)).collect();
    assert_eq!(personas, expected);

    for methodology in Methodology::ALL {
        let counts = store.profile_counts(&run.snapshot_id, methodology).expect("profiles");
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, run.customers.len(), "{}", methodology.key());
    }

    for methodology in Methodology::ALL {
        let cells = store.profile_venue_cells(&run.snapshot_id, methodology).expect("crosstab");
        let expected: Vec<_> = run
            .reports
            .profile_venue
            .iter()
            .filter(|c| c.methodology == methodology)
            .cloned()
            .collect();
        assert_eq!(cells, expected, "{} crosstab", methodology.key());
    }

    let breakdowns = store
        .report_document(&run.snapshot_id, DOC_VENUE_BREAKDOWNS)
        .expect("query")
        .expect("venue breakdowns stored");
    let parsed: VenueBreakdowns = serde_json::from_str(&breakdowns).expect("venue breakdown JSON");
    assert_eq!(parsed.top_stores, run.reports.by_venue.top_stores);
    assert_eq!(parsed.by_gender.len(), run.reports.by_venue.by_gender.len());

    for name in [DOC_HIGH_SPENDERS, DOC_DEMOGRAPHICS, DOC_INGEST] {
        let payload = store
            .report_document(&run.snapshot_id, name)
            .expect("query")
            .unwrap_or_else(|| panic!("document {name} missing"));
        serde_json::from_str::<serde_json::Value>(&payload).expect("valid JSON");
    }
    assert!(store.report_document(&run.snapshot_id, "nope").expect("query").is_none());
}

#[test]
fn event_log_is_persisted_in_order() {
    let store = store();
    let run = synthetic_run(10, 200);
    store.publish_run(&run).expect("publish");

    let events = store.events(&run.snapshot_id).expect("events");
    let stored: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
    let emitted: Vec<&str> = run.events.iter().map(RunEvent::event_type).collect();
    assert_eq!(stored, emitted);
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(RunEvent::RunCompleted { .. })));
}

#[test]
fn rejection_counts_are_published_with_the_run() {
    let snapshot = Snapshot::from_raw(
        "with-rejections",
        vec![
            raw_txn("C1", "100"),
            raw_txn("C2", "-3"),
            raw_txn("C3", "0"),
            raw_txn("", "10"),
        ],
        Vec::new(),
    );
    let run = SegmentationEngine::new(EngineConfig::standard())
        .expect("valid config")
        .run(&snapshot)
        .expect("run");

    let store = store();
    store.publish_run(&run).expect("publish");
    assert_eq!(store.rejection_count("with-rejections", "non_positive_amount").expect("count"), 2);
    assert_eq!(store.rejection_count("with-rejections", "missing_customer_id").expect("count"), 1);
    assert_eq!(store.rejection_count("with-rejections", "duplicate_customer").expect("count"), 0);

    let ingest = store
        .report_document("with-rejections", DOC_INGEST)
        .expect("query")
        .expect("ingest report stored");
    let parsed: IngestReport = serde_json::from_str(&ingest).expect("ingest report JSON");
    assert_eq!(parsed, run.ingest);
}

#[test]
fn file_backed_store_survives_reopening() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("segments.db");
    let path = path.to_str().expect("utf-8 path");
    let run = synthetic_run(11, 150);

    {
        let store = SegStore::open(path).expect("open");
        store.migrate().expect("migration");
        store.publish_run(&run).expect("publish");
    }

    let reopened = SegStore::open(path).expect("reopen");
    reopened.migrate().expect("migrations are idempotent");
    assert!(reopened.run_exists(&run.snapshot_id).expect("exists"));
    assert_eq!(
        reopened.count_rows("customer_classification", &run.snapshot_id).expect("count"),
        run.customers.len()
    );
}
