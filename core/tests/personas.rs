use chrono::{Duration, NaiveDate, NaiveDateTime};
use segmentation_core::{
    ledger::{CustomerRecord, IngestReport, Snapshot, Transaction},
    persona::Persona,
    synthetic::{generate, SyntheticSpec},
    types::Gender,
    EngineConfig, SegmentationEngine, SegmentationRun,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid date")
}

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .expect("valid timestamp")
        + Duration::days(offset)
}

/// Birth date giving `age` full years at the reference date.
fn born(age: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024 - age, 6, 15)
}

fn customer(id: &str, gender: Gender, age: i32) -> CustomerRecord {
    CustomerRecord {
        customer_id: id.into(),
        gender,
        birth_date: born(age),
    }
}

/// `count` purchases of `amount` each in `category` at venue V.
fn purchases(id: &str, count: usize, amount: f64, category: &str) -> Vec<Transaction> {
    (0..count)
        .map(|k| Transaction {
            customer_id: id.into(),
            venue_id: "V".into(),
            amount,
            timestamp: day(k as i64),
            category: category.into(),
            store_id: "V-L01".into(),
        })
        .collect()
}

/// Twenty ordinary customers valued 100..2000, so venue V has a real p90.
fn background() -> (Vec<Transaction>, Vec<CustomerRecord>) {
    let mut txns = Vec::new();
    let mut dims = Vec::new();
    for i in 1..=20 {
        let id = format!("BG{i:02}");
        txns.extend(purchases(&id, 1, 100.0 * i as f64, "Services"));
        dims.push(customer(&id, Gender::Male, 45));
    }
    (txns, dims)
}

fn run_with(config: EngineConfig, txns: Vec<Transaction>, dims: Vec<CustomerRecord>) -> SegmentationRun {
    let snapshot = Snapshot {
        snapshot_id: "personas".into(),
        transactions: txns,
        customers: dims,
        report: IngestReport::default(),
    };
    SegmentationEngine::new(config)
        .expect("valid config")
        .run(&snapshot)
        .expect("run")
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::standard();
    config.reference_date = Some(reference());
    config
}

fn persona_of(run: &SegmentationRun, id: &str) -> Persona {
    run.customer(id).expect("customer classified").persona
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn every_customer_gets_exactly_one_persona() {
    let engine = SegmentationEngine::new(EngineConfig::standard()).expect("valid config");
    let run = engine
        .run(&generate(&SyntheticSpec::new(5, 1_500)))
        .expect("run");

    let counted: usize = run.reports.personas.iter().map(|p| p.customers).sum();
    assert_eq!(counted, run.customers.len(), "persona counts must cover the population");
    assert_eq!(run.reports.personas.len(), Persona::CASCADE.len());
    assert_eq!(run.persona_assignments().len(), run.customers.len());
}

#[test]
fn engaged_young_customer_outranks_category_rules() {
    let (mut txns, mut dims) = background();
    // 28-year-old woman, six Beauty purchases, not a high spender.
    txns.extend(purchases("ANA", 6, 50.0, "Beauty"));
    dims.push(customer("ANA", Gender::Female, 28));

    let run = run_with(config(), txns, dims);
    let ana = run.customer("ANA").expect("ANA classified");
    assert_eq!(ana.age, Some(28));
    assert!(!ana.high_spender);
    assert_eq!(ana.persona, Persona::JovemEngajado);
}

#[test]
fn thirty_two_year_old_frequent_shopper_falls_to_category_rules() {
    let (mut txns, mut dims) = background();
    txns.extend(purchases("BIA", 6, 50.0, "Footwear"));
    dims.push(customer("BIA", Gender::Female, 32));
    txns.extend(purchases("CAU", 6, 50.0, "Beauty"));
    dims.push(customer("CAU", Gender::Female, 32));

    let run = run_with(config(), txns, dims);
    assert_eq!(persona_of(&run, "BIA"), Persona::MaeModerna);
    assert_eq!(persona_of(&run, "CAU"), Persona::BeautyLover);
}

#[test]
fn high_spender_rules_come_first() {
    let (mut txns, mut dims) = background();
    txns.extend(purchases("FAB", 5, 1000.0, "Fashion"));
    dims.push(customer("FAB", Gender::Female, 35));
    txns.extend(purchases("EXE", 5, 1000.0, "Electronics"));
    dims.push(customer("EXE", Gender::Male, 41));
    txns.extend(purchases("SEN", 5, 1000.0, "Food/Dining"));
    dims.push(customer("SEN", Gender::Female, 61));

    let run = run_with(config(), txns, dims);
    for id in ["FAB", "EXE", "SEN"] {
        assert!(run.customer(id).expect(id).high_spender, "{id} should clear the venue p90");
    }
    assert_eq!(persona_of(&run, "FAB"), Persona::FashionistaPremium);
    assert_eq!(persona_of(&run, "EXE"), Persona::ExecutivoExigente);
    assert_eq!(persona_of(&run, "SEN"), Persona::SeniorVip);
}

#[test]
fn high_spender_without_demographics_is_cliente_premium() {
    let (mut txns, dims) = background();
    // No dimension row: unknown gender and age.
    txns.extend(purchases("ANON", 2, 5000.0, "Home"));

    let run = run_with(config(), txns, dims);
    let anon = run.customer("ANON").expect("ANON classified");
    assert_eq!(anon.gender, Gender::Unspecified);
    assert_eq!(anon.age, None);
    assert_eq!(anon.persona, Persona::ClientePremium);
}

#[test]
fn selective_buyer_uses_the_global_p75() {
    let (mut txns, mut dims) = background();
    // 1600 is below the venue p90 but above the global p75.
    txns.extend(purchases("SEL", 1, 1600.0, "Electronics"));
    dims.push(customer("SEL", Gender::Male, 45));

    let run = run_with(config(), txns, dims);
    let cut = run.selective_threshold.expect("global p75 defined");
    assert!(cut <= 1600.0, "p75 {cut} should not exceed 1600");
    assert!(!run.customer("SEL").expect("SEL").high_spender);
    assert_eq!(persona_of(&run, "SEL"), Persona::CompradorSeletivo);
}

#[test]
fn age_fallbacks_and_catch_all() {
    let (mut txns, mut dims) = background();
    txns.extend(purchases("OLD", 1, 60.0, "Home"));
    dims.push(customer("OLD", Gender::Male, 72));
    txns.extend(purchases("KID", 1, 60.0, "Home"));
    dims.push(customer("KID", Gender::Female, 19));

    let run = run_with(config(), txns, dims);
    assert_eq!(persona_of(&run, "OLD"), Persona::SeniorTradicional);
    assert_eq!(persona_of(&run, "KID"), Persona::JovemExplorer);
    assert_eq!(persona_of(&run, "BG01"), Persona::ClienteRegular);
}

#[test]
fn cascade_order_is_part_of_the_contract() {
    let (mut txns, mut dims) = background();
    txns.extend(purchases("ANA", 6, 50.0, "Beauty"));
    dims.push(customer("ANA", Gender::Female, 28));

    let mut reordered = config();
    let engaged = reordered
        .persona_cascade
        .iter()
        .position(|p| *p == Persona::JovemEngajado)
        .expect("present");
    let beauty = reordered
        .persona_cascade
        .iter()
        .position(|p| *p == Persona::BeautyLover)
        .expect("present");
    reordered.persona_cascade.swap(engaged, beauty);

    let standard = run_with(config(), txns.clone(), dims.clone());
    let swapped = run_with(reordered, txns, dims);
    assert_eq!(persona_of(&standard, "ANA"), Persona::JovemEngajado);
    assert_eq!(persona_of(&swapped, "ANA"), Persona::BeautyLover);
}
