use chrono::{NaiveDate, NaiveDateTime};
use segmentation_core::{
    config::PeriodWindow,
    ledger::{IngestReport, Snapshot, Transaction},
    types::{ClassificationMode, Profile},
    EngineConfig, SegmentationEngine, SegmentationRun,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(11, 30, 0).expect("valid time")
}

fn txn(customer: &str, amount: f64, when: NaiveDateTime) -> Transaction {
    Transaction {
        customer_id: customer.into(),
        venue_id: "V1".into(),
        amount,
        timestamp: when,
        category: "Home".into(),
        store_id: "V1-L01".into(),
    }
}

fn run_with(config: EngineConfig, transactions: Vec<Transaction>) -> SegmentationRun {
    let snapshot = Snapshot {
        snapshot_id: "value-bands".into(),
        transactions,
        customers: Vec::new(),
        report: IngestReport::default(),
    };
    SegmentationEngine::new(config)
        .expect("valid config")
        .run(&snapshot)
        .expect("run")
}

fn historic(run: &SegmentationRun, customer: &str) -> Profile {
    run.customer(customer).expect("customer classified").historic_profile
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn lifetime_boundaries_belong_to_the_upper_band() {
    let run = run_with(
        EngineConfig::standard(),
        vec![
            txn("EXACT", 5000.0, at(2024, 1, 5)),
            txn("BELOW", 4999.99, at(2024, 1, 5)),
            txn("P2500", 2500.0, at(2024, 1, 5)),
            txn("P1000", 600.0, at(2024, 1, 5)),
            txn("P1000", 400.0, at(2024, 2, 5)),
            txn("SMALL", 999.99, at(2024, 1, 5)),
        ],
    );
    assert_eq!(historic(&run, "EXACT"), Profile::Vip, "exactly 5000 is VIP");
    assert_eq!(historic(&run, "BELOW"), Profile::Premium, "4999.99 is Premium");
    assert_eq!(historic(&run, "P2500"), Profile::Premium);
    assert_eq!(historic(&run, "P1000"), Profile::Potencial, "values are summed across purchases");
    assert_eq!(historic(&run, "SMALL"), Profile::Pontual);
}

#[test]
fn period_mode_reads_only_the_window() {
    let mut config = EngineConfig::standard();
    config.period = Some(PeriodWindow {
        start: date(2024, 7, 1),
        end: date(2024, 12, 31),
    });
    let run = run_with(
        config,
        vec![
            // Lifetime 6000 (VIP), period 1500 (Premium).
            txn("A", 4500.0, at(2024, 3, 10)),
            txn("A", 1500.0, at(2024, 8, 10)),
            // Lifetime 2100, all inside the window: period VIP.
            txn("B", 2100.0, at(2024, 12, 31)),
            // Nothing inside the window.
            txn("C", 3000.0, at(2024, 6, 30)),
        ],
    );

    let a = run.customer("A").expect("A");
    assert_eq!(a.period_value, 1500.0);
    assert_eq!(a.historic_profile, Profile::Vip);
    assert_eq!(a.period_profile, Profile::Premium);

    let b = run.customer("B").expect("B");
    assert_eq!(b.period_profile, Profile::Vip, "window end is inclusive");
    assert_eq!(b.historic_profile, Profile::Potencial);

    let c = run.customer("C").expect("C");
    assert_eq!(c.period_value, 0.0);
    assert_eq!(c.period_profile, Profile::Pontual);
}

#[test]
fn without_a_window_period_value_is_the_whole_snapshot() {
    let run = run_with(
        EngineConfig::standard(),
        vec![txn("A", 700.0, at(2023, 1, 1)), txn("A", 800.0, at(2024, 1, 1))],
    );
    let a = run.customer("A").expect("A");
    assert_eq!(a.period_value, a.total_value);
    assert_eq!(a.period_profile, Profile::Premium);
}

#[test]
fn one_customer_never_moves_another_customers_band() {
    let base = vec![
        txn("A", 1200.0, at(2024, 1, 1)),
        txn("B", 3000.0, at(2024, 1, 2)),
        txn("C", 80.0, at(2024, 1, 3)),
    ];
    let mut with_whale = base.clone();
    with_whale.push(txn("WHALE", 1_000_000.0, at(2024, 1, 4)));

    let plain = run_with(EngineConfig::standard(), base);
    let whale = run_with(EngineConfig::standard(), with_whale);

    for id in ["A", "B", "C"] {
        assert_eq!(
            historic(&plain, id),
            historic(&whale, id),
            "{id}'s value band changed because another customer was added"
        );
    }
}

#[test]
fn value_band_rows_expose_both_modes() {
    let run = run_with(EngineConfig::standard(), vec![txn("A", 2600.0, at(2024, 5, 1))]);
    let historic = run.value_band_profiles(ClassificationMode::Historic);
    let period = run.value_band_profiles(ClassificationMode::Period);

    assert_eq!(historic.len(), 1);
    assert_eq!(historic[0].classification_mode, ClassificationMode::Historic);
    assert_eq!(historic[0].profile, Profile::Premium);
    assert_eq!(period[0].classification_mode, ClassificationMode::Period);
    assert_eq!(period[0].profile, Profile::Vip);
}
