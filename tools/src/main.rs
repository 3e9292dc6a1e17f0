//! segment-runner: headless batch runner for the segmentation engine.
//!
//! Usage:
//!   segment-runner --transactions ledger.csv --customers customers.csv --db out.db
//!   segment-runner --synthetic 5000 --seed 42 --config data/engine_config.json

use anyhow::{Context, Result};
use clap::Parser;
use segmentation_core::{
    engine::SegmentationRun,
    synthetic::{self, SyntheticSpec},
    types::{Methodology, Profile},
    EngineConfig, SegStore, SegmentationEngine, Snapshot,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "segment-runner",
    version,
    about = "Run the customer segmentation engine over one ledger snapshot",
    after_help = r#"
EXAMPLES:
  segment-runner --transactions ledger.csv --customers customers.csv
  segment-runner --transactions ledger.csv --customers customers.csv --db out.db --snapshot-id 2024-H1
  segment-runner --synthetic 5000 --seed 7 --sequential
"#
)]
struct Cli {
    /// Transaction ledger CSV.
    #[arg(long, required_unless_present = "synthetic", requires = "customers")]
    transactions: Option<PathBuf>,

    /// Customer dimension CSV.
    #[arg(long)]
    customers: Option<PathBuf>,

    /// Generate a synthetic ledger with this many customers instead of reading CSV.
    #[arg(long, conflicts_with = "transactions")]
    synthetic: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Venues in the synthetic ledger.
    #[arg(long, default_value_t = 4)]
    venues: usize,

    /// Engine configuration JSON. Defaults to the built-in production values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite output database.
    #[arg(long, default_value = ":memory:")]
    db: String,

    /// Snapshot identifier; defaults to the ledger file stem.
    #[arg(long)]
    snapshot_id: Option<String>,

    /// Classify on one thread.
    #[arg(long)]
    sequential: bool,

    /// Also write the full run output as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(&path.to_string_lossy())
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::standard(),
    };
    if cli.sequential {
        config.parallel = false;
    }

    let snapshot = load_snapshot(&cli)?;
    let engine = SegmentationEngine::new(config)?;
    log::debug!(
        "percentile method {:?}, cascade {:?}",
        engine.config().percentile_method,
        engine.cascade()
    );
    let run = engine.run(&snapshot)?;

    let store = SegStore::open(&cli.db).with_context(|| format!("opening {}", cli.db))?;
    store.migrate()?;
    store.publish_run(&run)?;
    log::info!("run {} published to {}", run.snapshot_id, cli.db);

    if let Some(path) = &cli.json {
        std::fs::write(path, run.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    print_summary(&run);
    Ok(())
}

fn load_snapshot(cli: &Cli) -> Result<Snapshot> {
    if let Some(customers) = cli.synthetic {
        let spec = SyntheticSpec {
            seed: cli.seed,
            customers,
            venues: cli.venues,
            ..SyntheticSpec::default()
        };
        let mut snapshot = synthetic::generate(&spec);
        if let Some(id) = &cli.snapshot_id {
            snapshot.snapshot_id = id.clone();
        }
        return Ok(snapshot);
    }

    let (Some(transactions), Some(customers)) = (&cli.transactions, &cli.customers) else {
        anyhow::bail!("--transactions and --customers are required without --synthetic");
    };
    let snapshot_id = cli.snapshot_id.clone().unwrap_or_else(|| {
        transactions
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string())
    });
    let snapshot = Snapshot::load_files(
        snapshot_id,
        &transactions.to_string_lossy(),
        &customers.to_string_lossy(),
    )?;
    Ok(snapshot)
}

fn print_summary(run: &SegmentationRun) {
    let ingest = &run.ingest;
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  snapshot:        {}", run.snapshot_id);
    println!(
        "  reference date:  {}",
        run.reference_date.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    println!("  transactions:    {} read, {} accepted", ingest.transactions_read, ingest.transactions_accepted);
    println!("  customer rows:   {} read, {} accepted", ingest.customers_read, ingest.customers_accepted);
    println!("  excluded rows:   {}", ingest.excluded());
    for (reason, count) in &ingest.rejections {
        println!("    {reason:?}: {count}");
    }
    println!("  customers:       {}", run.customers.len());

    println!();
    println!("=== VENUES ===");
    for v in &run.reports.venues {
        let threshold = v
            .p90_value
            .map_or_else(|| "undefined".to_string(), |t| format!("{t:.2}"));
        println!(
            "  {:<12} customers: {:>6} | p90: {:>12} | high spenders: {:>5}{}",
            v.venue_id,
            v.customers,
            threshold,
            v.high_spenders,
            if v.low_confidence { " (low confidence)" } else { "" }
        );
    }

    println!();
    println!("=== PERSONAS ===");
    for p in run.reports.personas.iter().filter(|p| p.customers > 0) {
        println!(
            "  {:<20} {:>6} ({:>5.1}%) | value share {:>5.1}%",
            p.persona.label(),
            p.customers,
            p.customer_share * 100.0,
            p.value_share * 100.0
        );
    }

    println!();
    println!("=== PROFILES ===");
    for methodology in Methodology::ALL {
        let counts: Vec<String> = Profile::ALL
            .iter()
            .map(|profile| {
                let n = run
                    .reports
                    .profiles
                    .iter()
                    .find(|s| s.methodology == methodology && s.profile == *profile)
                    .map_or(0, |s| s.customers);
                format!("{} {n}", profile.label())
            })
            .collect();
        println!("  {:<14} {}", methodology.key(), counts.join(" | "));
    }
}
