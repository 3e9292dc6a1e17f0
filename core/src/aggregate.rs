//! Aggregator: reduces the transaction ledger to one row per customer,
//! and separately one row per (customer, venue) pair.
//!
//! Every accepted transaction contributes to exactly one global row and
//! one venue row. Customers missing from the dimension table are kept
//! with `Gender::Unspecified` and unknown age.

use crate::{
    config::EngineConfig,
    ledger::{CustomerRecord, Snapshot, Transaction},
    types::{AgeBand, CustomerId, Gender, Money, VenueId, UNSPECIFIED},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerAggregate {
    pub customer_id: CustomerId,
    /// Lifetime value over the whole snapshot (venue value for venue rows).
    pub total_value: Money,
    /// Value of transactions inside the configured period window.
    pub period_value: Money,
    pub transaction_count: usize,
    pub first_purchase_at: NaiveDateTime,
    pub last_purchase_at: NaiveDateTime,
    pub gender: Gender,
    pub age: Option<u32>,
    pub dominant_category: String,
    pub dominant_store: String,
    /// For venue rows this is always the row's own venue.
    pub dominant_venue: VenueId,
}

impl CustomerAggregate {
    pub fn age_band(&self) -> AgeBand {
        AgeBand::of(self.age)
    }
}

/// Aggregator output: the global population plus one population per venue.
/// All vectors are ordered by customer id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateSet {
    pub global: Vec<CustomerAggregate>,
    pub per_venue: BTreeMap<VenueId, Vec<CustomerAggregate>>,
    /// Date ages were computed at; `None` only for an empty ledger.
    pub reference_date: Option<NaiveDate>,
}

impl AggregateSet {
    pub fn venue_population(&self, venue_id: &str) -> &[CustomerAggregate] {
        self.per_venue.get(venue_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The customer's row at one venue.
    pub fn at_venue(&self, customer_id: &str, venue_id: &str) -> Option<&CustomerAggregate> {
        let rows = self.venue_population(venue_id);
        rows.binary_search_by(|row| row.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|idx| &rows[idx])
    }
}

// ── Accumulation ───────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tally {
    total: Money,
    period: Money,
    count: usize,
    first: Option<NaiveDateTime>,
    last: Option<NaiveDateTime>,
    categories: BTreeMap<String, Money>,
    stores: BTreeMap<String, Money>,
}

impl Tally {
    fn add(&mut self, txn: &Transaction, in_period: bool) {
        self.total += txn.amount;
        if in_period {
            self.period += txn.amount;
        }
        self.count += 1;
        self.first = Some(self.first.map_or(txn.timestamp, |f| f.min(txn.timestamp)));
        self.last = Some(self.last.map_or(txn.timestamp, |l| l.max(txn.timestamp)));
        *self.categories.entry(txn.category.clone()).or_insert(0.0) += txn.amount;
        *self.stores.entry(txn.store_id.clone()).or_insert(0.0) += txn.amount;
    }
}

#[derive(Debug, Default)]
struct CustomerTally {
    overall: Tally,
    venues: BTreeMap<VenueId, Tally>,
}

/// Key with the largest summed amount; ties go to the lexicographically
/// smallest key.
fn dominant_key(amounts: &BTreeMap<String, Money>) -> String {
    let mut best: Option<(&String, Money)> = None;
    for (key, amount) in amounts {
        match best {
            Some((_, best_amount)) if *amount <= best_amount => {}
            _ => best = Some((key, *amount)),
        }
    }
    best.map(|(k, _)| k.clone())
        .unwrap_or_else(|| UNSPECIFIED.to_string())
}

/// Venue with the largest value; ties go to the earliest first purchase,
/// then to the smallest venue id.
fn dominant_venue(venues: &BTreeMap<VenueId, Tally>) -> VenueId {
    let mut best: Option<(&VenueId, &Tally)> = None;
    for (venue_id, tally) in venues {
        let better = match best {
            None => true,
            Some((_, b)) => tally.total > b.total || (tally.total == b.total && tally.first < b.first),
        };
        if better {
            best = Some((venue_id, tally));
        }
    }
    best.map(|(v, _)| v.clone()).unwrap_or_default()
}

/// Full years elapsed between `birth` and `on`; `None` for future births.
pub fn age_at(birth: NaiveDate, on: NaiveDate) -> Option<u32> {
    if birth > on {
        return None;
    }
    let mut years = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

fn build_row(
    customer_id: &str,
    tally: &Tally,
    demographics: (Gender, Option<u32>),
    venue: VenueId,
) -> Option<CustomerAggregate> {
    Some(CustomerAggregate {
        customer_id: customer_id.to_string(),
        total_value: tally.total,
        period_value: tally.period,
        transaction_count: tally.count,
        first_purchase_at: tally.first?,
        last_purchase_at: tally.last?,
        gender: demographics.0,
        age: demographics.1,
        dominant_category: dominant_key(&tally.categories),
        dominant_store: dominant_key(&tally.stores),
        dominant_venue: venue,
    })
}

/// Reduce a snapshot to customer aggregates.
pub fn aggregate(snapshot: &Snapshot, config: &EngineConfig) -> AggregateSet {
    let reference_date = config.reference_date.or_else(|| {
        snapshot
            .transactions
            .iter()
            .map(|t| t.timestamp.date())
            .max()
    });

    let dimension: HashMap<&str, &CustomerRecord> = snapshot
        .customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();

    let mut tallies: BTreeMap<&str, CustomerTally> = BTreeMap::new();
    for txn in &snapshot.transactions {
        let in_period = config.period.map_or(true, |w| w.contains(txn.timestamp));
        let entry = tallies.entry(txn.customer_id.as_str()).or_default();
        entry.overall.add(txn, in_period);
        entry
            .venues
            .entry(txn.venue_id.clone())
            .or_default()
            .add(txn, in_period);
    }

    let mut global = Vec::with_capacity(tallies.len());
    let mut per_venue: BTreeMap<VenueId, Vec<CustomerAggregate>> = BTreeMap::new();

    for (customer_id, tally) in &tallies {
        let demographics = match dimension.get(customer_id) {
            Some(record) => (
                record.gender,
                record
                    .birth_date
                    .zip(reference_date)
                    .and_then(|(birth, on)| age_at(birth, on)),
            ),
            None => (Gender::Unspecified, None),
        };

        let home = dominant_venue(&tally.venues);
        if let Some(row) = build_row(customer_id, &tally.overall, demographics, home) {
            global.push(row);
        }
        for (venue_id, venue_tally) in &tally.venues {
            if let Some(row) = build_row(customer_id, venue_tally, demographics, venue_id.clone()) {
                per_venue.entry(venue_id.clone()).or_default().push(row);
            }
        }
    }

    log::debug!(
        "aggregate: {} customers across {} venues (reference date {:?})",
        global.len(),
        per_venue.len(),
        reference_date
    );

    AggregateSet {
        global,
        per_venue,
        reference_date,
    }
}
