//! Seeded synthetic ledger generator.
//!
//! Produces a plausible mall-network snapshot: a customer dimension with
//! mixed demographics and a transaction ledger with Pareto-distributed
//! ticket sizes and purchase counts. The same `SyntheticSpec` always yields the same
//! snapshot. Used by the runner's `--synthetic` mode and by scale tests.

use crate::{
    ledger::{CustomerRecord, IngestReport, Snapshot, Transaction},
    rng::{RngStream, SeededRng},
    types::Gender,
};
use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Category labels with their share of purchases.
const CATEGORIES: [(&str, f64); 10] = [
    ("Fashion", 0.22),
    ("Food/Dining", 0.18),
    ("Beauty", 0.10),
    ("Footwear", 0.08),
    ("Children's", 0.07),
    ("Sports", 0.07),
    ("Electronics", 0.10),
    ("Home", 0.08),
    ("Services", 0.05),
    ("Entertainment", 0.05),
];

const STORES_PER_VENUE: u64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub seed: u64,
    pub customers: usize,
    pub venues: usize,
    /// First day of the ledger window.
    pub start: NaiveDate,
    /// Window length in days.
    pub days: u32,
    /// Probability that a purchase happens at the customer's home venue.
    pub home_venue_loyalty: f64,
}

impl SyntheticSpec {
    pub fn new(seed: u64, customers: usize) -> Self {
        Self {
            seed,
            customers,
            ..Self::default()
        }
    }
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            customers: 1_000,
            venues: 4,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            days: 180,
            home_venue_loyalty: 0.8,
        }
    }
}

pub fn venue_id(index: u64) -> String {
    format!("SHOP-{:02}", index + 1)
}

fn pick_category(rng: &mut SeededRng) -> &'static str {
    let roll = rng.next_f64();
    let mut cumulative = 0.0;
    for (category, share) in CATEGORIES {
        cumulative += share;
        if roll < cumulative {
            return category;
        }
    }
    CATEGORIES[CATEGORIES.len() - 1].0
}

fn pick_gender(rng: &mut SeededRng) -> Gender {
    let roll = rng.next_f64();
    if roll < 0.55 {
        Gender::Female
    } else if roll < 0.95 {
        Gender::Male
    } else {
        Gender::Unspecified
    }
}

/// Build the snapshot. Every generated row is valid, so the ingest report
/// shows full acceptance.
pub fn generate(spec: &SyntheticSpec) -> Snapshot {
    let mut people = SeededRng::new(spec.seed, RngStream::Customers);
    let mut purchases = SeededRng::new(spec.seed, RngStream::Transactions);

    let venues = spec.venues.max(1) as u64;
    let days = u64::from(spec.days.max(1));
    let window_end = spec.start + Duration::days(days as i64);

    let mut customers = Vec::with_capacity(spec.customers);
    let mut transactions = Vec::new();

    for n in 0..spec.customers {
        let customer_id = format!("C{:06}", n + 1);

        // Roughly 5% of the dimension has no usable birth date.
        let birth_date = if people.chance(0.05) {
            None
        } else {
            let age_years = people.range(16, 86) as u32;
            let offset_days = people.below(365) as i64;
            window_end
                .checked_sub_months(Months::new(age_years * 12))
                .map(|d| d - Duration::days(offset_days))
        };
        customers.push(CustomerRecord {
            customer_id: customer_id.clone(),
            gender: pick_gender(&mut people),
            birth_date,
        });

        let home = people.below(venues);
        let favourite = pick_category(&mut people);
        let count = (people.pareto(1.0, 1.2).floor() as usize).clamp(1, 40);

        for _ in 0..count {
            let venue = if purchases.chance(spec.home_venue_loyalty) {
                home
            } else {
                purchases.below(venues)
            };
            let category = if purchases.chance(0.6) {
                favourite
            } else {
                pick_category(&mut purchases)
            };
            let raw_amount = purchases.pareto(40.0, 1.6).min(25_000.0);
            let amount = (raw_amount * 100.0).round() / 100.0;
            let day = purchases.below(days) as i64;
            let hour = purchases.range(9, 23) as i64;
            let minute = purchases.below(60) as i64;
            let timestamp = (spec.start + Duration::days(day))
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                + Duration::hours(hour)
                + Duration::minutes(minute);

            transactions.push(Transaction {
                customer_id: customer_id.clone(),
                venue_id: venue_id(venue),
                amount,
                timestamp,
                category: category.to_string(),
                store_id: format!("{}-L{:02}", venue_id(venue), purchases.below(STORES_PER_VENUE) + 1),
            });
        }
    }

    log::debug!(
        "synthetic: {} customers, {} transactions across {} venues (seed {}, streams {}/{})",
        customers.len(),
        transactions.len(),
        venues,
        spec.seed,
        people.name,
        purchases.name
    );

    let report = IngestReport {
        transactions_read: transactions.len(),
        transactions_accepted: transactions.len(),
        customers_read: customers.len(),
        customers_accepted: customers.len(),
        ..IngestReport::default()
    };

    Snapshot {
        snapshot_id: format!("synthetic-{}-{}", spec.seed, spec.customers),
        transactions,
        customers,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_snapshot() {
        let spec = SyntheticSpec::new(7, 200);
        let a = generate(&spec);
        let b = generate(&spec);
        assert_eq!(a.transactions, b.transactions);
        assert_eq!(a.customers, b.customers);
    }

    #[test]
    fn every_customer_buys_at_least_once() {
        let snapshot = generate(&SyntheticSpec::new(3, 150));
        for c in &snapshot.customers {
            assert!(
                snapshot.transactions.iter().any(|t| t.customer_id == c.customer_id),
                "{} has no transactions",
                c.customer_id
            );
        }
        assert!(snapshot.transactions.iter().all(|t| t.amount > 0.0));
    }
}
