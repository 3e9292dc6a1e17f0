//! Report builders: mechanical aggregations over the classified population.
//!
//! Every builder is a pure function of the phase-2 output. Tables are
//! ordered deterministically (enum order, then id) so identical snapshots
//! serialize to identical bytes. Ratios with an empty denominator are 0;
//! means over an empty set are `None` where the column is optional.

use crate::{
    aggregate::AggregateSet,
    config::EngineConfig,
    engine::CustomerClassification,
    ledger::{Snapshot, Transaction},
    persona::{Persona, PersonaCascade},
    rfv::RfvScores,
    threshold::ThresholdTable,
    types::{AgeBand, DayPeriod, Gender, Methodology, Money, Profile, Scope, VenueId},
};
use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn mean_age(ages: impl Iterator<Item = Option<u32>>) -> Option<f64> {
    let known: Vec<u32> = ages.flatten().collect();
    if known.is_empty() {
        None
    } else {
        Some(known.iter().map(|a| f64::from(*a)).sum::<f64>() / known.len() as f64)
    }
}

// ── Venue summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueSummary {
    pub venue_id: VenueId,
    pub customers: usize,
    pub total_value: Money,
    pub mean_ticket: Money,
    pub p90_value: Option<Money>,
    pub low_confidence: bool,
    pub high_spenders: usize,
    pub high_spender_value: Money,
}

/// One row per venue. High spenders are counted at every venue where they
/// clear the threshold, not only at their dominant venue.
pub fn venue_summaries(set: &AggregateSet, thresholds: &ThresholdTable) -> Vec<VenueSummary> {
    set.per_venue
        .iter()
        .map(|(venue_id, rows)| {
            let total_value: Money = rows.iter().map(|r| r.total_value).sum();
            let flagged: Vec<_> = rows.iter().filter(|r| thresholds.is_high_spender(r)).collect();
            let threshold = thresholds.get(venue_id);
            VenueSummary {
                venue_id: venue_id.clone(),
                customers: rows.len(),
                total_value,
                mean_ticket: ratio(total_value, rows.len() as f64),
                p90_value: threshold.and_then(|t| t.p90_value),
                low_confidence: threshold.map_or(true, |t| t.low_confidence),
                high_spenders: flagged.len(),
                high_spender_value: flagged.iter().map(|r| r.total_value).sum(),
            }
        })
        .collect()
}

// ── Profile summaries and crosstab ───────────────────────────────────────────

/// One classified unit under a methodology: a customer, or for PerVenue
/// RFV a (customer, venue) pair.
struct ProfiledUnit<'a> {
    profile: Profile,
    venue_id: &'a str,
    value: Money,
}

fn profiled_units<'a>(
    methodology: Methodology,
    customers: &'a [CustomerClassification],
    set: &'a AggregateSet,
    rfv: &'a RfvScores,
) -> Vec<ProfiledUnit<'a>> {
    match methodology {
        Methodology::Rfv { scope: Scope::PerVenue } => rfv
            .per_venue
            .iter()
            .flat_map(|(venue_id, scores)| {
                let rows = set.venue_population(venue_id);
                scores.iter().zip(rows).map(move |(score, row)| ProfiledUnit {
                    profile: score.profile,
                    venue_id: venue_id.as_str(),
                    value: row.total_value,
                })
            })
            .collect(),
        _ => customers
            .iter()
            .map(|c| ProfiledUnit {
                profile: c.profile(methodology),
                venue_id: c.dominant_venue.as_str(),
                value: c.value_for(methodology),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSummary {
    pub methodology: Methodology,
    pub profile: Profile,
    pub customers: usize,
    pub value: Money,
    pub mean_ticket: Money,
    pub customer_share: f64,
    pub value_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileVenueCell {
    pub methodology: Methodology,
    pub profile: Profile,
    pub venue_id: VenueId,
    pub customers: usize,
    pub value: Money,
    pub mean_ticket: Money,
}

/// The "resumé" rows: every methodology × every profile, zeros included.
pub fn profile_summaries(
    customers: &[CustomerClassification],
    set: &AggregateSet,
    rfv: &RfvScores,
) -> Vec<ProfileSummary> {
    let mut out = Vec::with_capacity(Methodology::ALL.len() * Profile::ALL.len());
    for methodology in Methodology::ALL {
        let units = profiled_units(methodology, customers, set, rfv);
        let all_value: Money = units.iter().map(|u| u.value).sum();
        for profile in Profile::ALL {
            let (count, value) = units
                .iter()
                .filter(|u| u.profile == profile)
                .fold((0usize, 0.0), |(n, v), u| (n + 1, v + u.value));
            out.push(ProfileSummary {
                methodology,
                profile,
                customers: count,
                value,
                mean_ticket: ratio(value, count as f64),
                customer_share: ratio(count as f64, units.len() as f64),
                value_share: ratio(value, all_value),
            });
        }
    }
    out
}

/// Profile × venue crosstab. Value-band and Global RFV units sit at the
/// customer's dominant venue; PerVenue units at the scored venue.
pub fn profile_venue_crosstab(
    customers: &[CustomerClassification],
    set: &AggregateSet,
    rfv: &RfvScores,
) -> Vec<ProfileVenueCell> {
    let venues: Vec<&VenueId> = set.per_venue.keys().collect();
    let mut out = Vec::new();
    for methodology in Methodology::ALL {
        let mut cells: HashMap<(Profile, &str), (usize, Money)> = HashMap::new();
        for unit in profiled_units(methodology, customers, set, rfv) {
            let cell = cells.entry((unit.profile, unit.venue_id)).or_insert((0, 0.0));
            cell.0 += 1;
            cell.1 += unit.value;
        }
        for profile in Profile::ALL {
            for venue_id in &venues {
                let (count, value) = cells
                    .get(&(profile, venue_id.as_str()))
                    .copied()
                    .unwrap_or((0, 0.0));
                out.push(ProfileVenueCell {
                    methodology,
                    profile,
                    venue_id: (*venue_id).clone(),
                    customers: count,
                    value,
                    mean_ticket: ratio(value, count as f64),
                });
            }
        }
    }
    out
}

// ── Persona summary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaSummary {
    pub persona: Persona,
    pub customers: usize,
    pub value: Money,
    pub mean_ticket: Money,
    pub mean_frequency: f64,
    /// Over customers with a known age only.
    pub mean_age: Option<f64>,
    pub customer_share: f64,
    pub value_share: f64,
}

/// All personas, ordered by customer count desc then cascade priority.
pub fn persona_summaries(
    customers: &[CustomerClassification],
    cascade: &PersonaCascade,
) -> Vec<PersonaSummary> {
    let all_value: Money = customers.iter().map(|c| c.total_value).sum();
    let mut out: Vec<PersonaSummary> = cascade
        .order()
        .map(|persona| {
            let members: Vec<&CustomerClassification> =
                customers.iter().filter(|c| c.persona == persona).collect();
            let value: Money = members.iter().map(|c| c.total_value).sum();
            let txns: usize = members.iter().map(|c| c.transaction_count).sum();
            PersonaSummary {
                persona,
                customers: members.len(),
                value,
                mean_ticket: ratio(value, members.len() as f64),
                mean_frequency: ratio(txns as f64, members.len() as f64),
                mean_age: mean_age(members.iter().map(|c| c.age)),
                customer_share: ratio(members.len() as f64, customers.len() as f64),
                value_share: ratio(value, all_value),
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.customers
            .cmp(&a.customers)
            .then_with(|| cascade.priority(a.persona).cmp(&cascade.priority(b.persona)))
    });
    out
}

// ── High spenders vs the rest ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupStats {
    pub customers: usize,
    pub value: Money,
    pub mean_ticket: Money,
    pub mean_frequency: f64,
    pub female_share: f64,
    pub mean_age: Option<f64>,
}

impl GroupStats {
    fn of(members: &[&CustomerClassification]) -> Self {
        let n = members.len() as f64;
        let value: Money = members.iter().map(|c| c.total_value).sum();
        let txns: usize = members.iter().map(|c| c.transaction_count).sum();
        let female = members.iter().filter(|c| c.gender == Gender::Female).count();
        Self {
            customers: members.len(),
            value,
            mean_ticket: ratio(value, n),
            mean_frequency: ratio(txns as f64, n),
            female_share: ratio(female as f64, n),
            mean_age: mean_age(members.iter().map(|c| c.age)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HighSpenderComparison {
    pub high_spenders: GroupStats,
    pub others: GroupStats,
}

/// Split on the dominant-venue high-spender flag.
pub fn high_spender_comparison(customers: &[CustomerClassification]) -> HighSpenderComparison {
    let (hs, others): (Vec<&CustomerClassification>, Vec<&CustomerClassification>) =
        customers.iter().partition(|c| c.high_spender);
    HighSpenderComparison {
        high_spenders: GroupStats::of(&hs),
        others: GroupStats::of(&others),
    }
}

// ── Demographics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemographicCell {
    pub gender: Gender,
    pub age_band: AgeBand,
    pub customers: usize,
    pub value: Money,
    pub mean_ticket: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupCount<G> {
    pub group: G,
    pub customers: usize,
    pub value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemographicReport {
    /// Full gender × age band grid, zeros included.
    pub matrix: Vec<DemographicCell>,
    pub high_spenders_by_gender: Vec<GroupCount<Gender>>,
    pub high_spenders_by_age_band: Vec<GroupCount<AgeBand>>,
}

fn group_counts<G: Copy + PartialEq>(
    groups: &[G],
    members: &[&CustomerClassification],
    key: impl Fn(&CustomerClassification) -> G,
) -> Vec<GroupCount<G>> {
    groups
        .iter()
        .map(|group| {
            let (customers, value) = members
                .iter()
                .filter(|c| key(c) == *group)
                .fold((0usize, 0.0), |(n, v), c| (n + 1, v + c.total_value));
            GroupCount { group: *group, customers, value }
        })
        .collect()
}

pub fn demographics(customers: &[CustomerClassification]) -> DemographicReport {
    let mut matrix = Vec::with_capacity(Gender::ALL.len() * AgeBand::ALL.len());
    for gender in Gender::ALL {
        for age_band in AgeBand::ALL {
            let (count, value) = customers
                .iter()
                .filter(|c| c.gender == gender && c.age_band == age_band)
                .fold((0usize, 0.0), |(n, v), c| (n + 1, v + c.total_value));
            matrix.push(DemographicCell {
                gender,
                age_band,
                customers: count,
                value,
                mean_ticket: ratio(value, count as f64),
            });
        }
    }

    let hs: Vec<&CustomerClassification> = customers.iter().filter(|c| c.high_spender).collect();
    DemographicReport {
        matrix,
        high_spenders_by_gender: group_counts(&Gender::ALL, &hs, |c| c.gender),
        high_spenders_by_age_band: group_counts(&AgeBand::ALL, &hs, |c| c.age_band),
    }
}

// ── Top categories ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopCategory<G> {
    pub group: G,
    pub rank: usize,
    pub category: String,
    pub value: Money,
    pub customers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopCategories {
    pub by_gender: Vec<TopCategory<Gender>>,
    pub by_age_band: Vec<TopCategory<AgeBand>>,
}

#[derive(Default)]
struct CategoryTally<'a> {
    value: Money,
    customers: BTreeSet<&'a str>,
}

impl<'a> CategoryTally<'a> {
    fn add(&mut self, amount: Money, customer_id: &'a str) {
        self.value += amount;
        self.customers.insert(customer_id);
    }
}

type Tallies<'a, G> = BTreeMap<G, BTreeMap<&'a str, CategoryTally<'a>>>;

/// Labels ranked by value desc within each group, `limit` per group.
/// `emit` receives (group, rank, label, value, distinct customers).
fn rank_labels<G: Clone + Ord, T>(
    tallies: Tallies<'_, G>,
    limit: usize,
    emit: impl Fn(G, usize, &str, Money, usize) -> T,
) -> Vec<T> {
    let mut out = Vec::new();
    for (group, labels) in tallies {
        let mut ranked: Vec<(&str, CategoryTally<'_>)> = labels.into_iter().collect();
        // Value desc; ties keep the name order from the map.
        ranked.sort_by(|a, b| b.1.value.total_cmp(&a.1.value));
        for (i, (label, tally)) in ranked.into_iter().take(limit).enumerate() {
            out.push(emit(group.clone(), i + 1, label, tally.value, tally.customers.len()));
        }
    }
    out
}

fn rank_categories<G: Copy + Ord>(tallies: Tallies<'_, G>, limit: usize) -> Vec<TopCategory<G>> {
    rank_labels(tallies, limit, |group, rank, category, value, customers| TopCategory {
        group,
        rank,
        category: category.to_string(),
        value,
        customers,
    })
}

/// Categories ranked by purchase value within each gender and age band.
pub fn top_categories(
    snapshot: &Snapshot,
    customers: &[CustomerClassification],
    limit: usize,
) -> TopCategories {
    let demographics: HashMap<&str, (Gender, AgeBand)> = customers
        .iter()
        .map(|c| (c.customer_id.as_str(), (c.gender, c.age_band)))
        .collect();

    let mut by_gender: Tallies<'_, Gender> = BTreeMap::new();
    let mut by_age: Tallies<'_, AgeBand> = BTreeMap::new();
    for txn in &snapshot.transactions {
        let Some((gender, age_band)) = demographics.get(txn.customer_id.as_str()).copied() else {
            continue;
        };
        for tally in [
            by_gender.entry(gender).or_default().entry(txn.category.as_str()).or_default(),
            by_age.entry(age_band).or_default().entry(txn.category.as_str()).or_default(),
        ] {
            tally.add(txn.amount, txn.customer_id.as_str());
        }
    }

    TopCategories {
        by_gender: rank_categories(by_gender, limit),
        by_age_band: rank_categories(by_age, limit),
    }
}

// ── Shopping behavior ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorCell<S> {
    pub age_band: AgeBand,
    pub slot: S,
    pub value: Money,
    pub transactions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingBehavior {
    pub by_day_period: Vec<BehaviorCell<DayPeriod>>,
    pub by_weekday: Vec<BehaviorCell<Weekday>>,
}

struct SlotTally<K> {
    periods: BTreeMap<(K, DayPeriod), (Money, usize)>,
    // Weekday has no Ord; key on its Monday-based index.
    weekdays: BTreeMap<(K, u32), (Weekday, Money, usize)>,
}

impl<K: Ord + Clone> SlotTally<K> {
    fn new() -> Self {
        Self {
            periods: BTreeMap::new(),
            weekdays: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: K, txn: &Transaction) {
        let period = self
            .periods
            .entry((key.clone(), DayPeriod::of_hour(txn.timestamp.hour())))
            .or_insert((0.0, 0));
        period.0 += txn.amount;
        period.1 += 1;

        let weekday = txn.timestamp.weekday();
        let day = self
            .weekdays
            .entry((key, weekday.num_days_from_monday()))
            .or_insert((weekday, 0.0, 0));
        day.1 += txn.amount;
        day.2 += 1;
    }
}

/// Value and transaction count per (age band, time slot). Only slots with
/// at least one purchase are emitted.
pub fn shopping_behavior(snapshot: &Snapshot, customers: &[CustomerClassification]) -> ShoppingBehavior {
    let bands: HashMap<&str, AgeBand> = customers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.age_band))
        .collect();

    let mut tally = SlotTally::new();
    for txn in &snapshot.transactions {
        if let Some(band) = bands.get(txn.customer_id.as_str()).copied() {
            tally.add(band, txn);
        }
    }

    ShoppingBehavior {
        by_day_period: tally
            .periods
            .into_iter()
            .map(|((age_band, slot), (value, transactions))| BehaviorCell {
                age_band,
                slot,
                value,
                transactions,
            })
            .collect(),
        by_weekday: tally
            .weekdays
            .into_iter()
            .map(|((age_band, _), (slot, value, transactions))| BehaviorCell {
                age_band,
                slot,
                value,
                transactions,
            })
            .collect(),
    }
}

// ── Per-venue breakdowns ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueGroupCount<G> {
    pub venue_id: VenueId,
    pub group: G,
    pub customers: usize,
    /// Value spent at this venue only.
    pub value: Money,
    pub customer_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueRanked {
    pub venue_id: VenueId,
    pub rank: usize,
    pub label: String,
    pub value: Money,
    pub customers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueSlot<S> {
    pub venue_id: VenueId,
    pub slot: S,
    pub value: Money,
    pub transactions: usize,
}

/// The demographic, ranking and behavior tables again, one block per venue.
/// A customer appears at every venue they bought at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueBreakdowns {
    /// venue × gender, zeros included.
    pub by_gender: Vec<VenueGroupCount<Gender>>,
    /// venue × age band, zeros included.
    pub by_age_band: Vec<VenueGroupCount<AgeBand>>,
    pub top_categories: Vec<VenueRanked>,
    pub top_stores: Vec<VenueRanked>,
    pub by_day_period: Vec<VenueSlot<DayPeriod>>,
    pub by_weekday: Vec<VenueSlot<Weekday>>,
}

fn venue_group_counts<G: Copy + PartialEq>(
    groups: &[G],
    set: &AggregateSet,
    key: impl Fn(&str) -> G,
) -> Vec<VenueGroupCount<G>> {
    let mut out = Vec::with_capacity(set.per_venue.len() * groups.len());
    for (venue_id, rows) in &set.per_venue {
        for group in groups {
            let (customers, value) = rows
                .iter()
                .filter(|r| key(r.customer_id.as_str()) == *group)
                .fold((0usize, 0.0), |(n, v), r| (n + 1, v + r.total_value));
            out.push(VenueGroupCount {
                venue_id: venue_id.clone(),
                group: *group,
                customers,
                value,
                customer_share: ratio(customers as f64, rows.len() as f64),
            });
        }
    }
    out
}

fn venue_ranked(venue_id: &str, rank: usize, label: &str, value: Money, customers: usize) -> VenueRanked {
    VenueRanked {
        venue_id: venue_id.to_string(),
        rank,
        label: label.to_string(),
        value,
        customers,
    }
}

pub fn venue_breakdowns(
    snapshot: &Snapshot,
    set: &AggregateSet,
    customers: &[CustomerClassification],
    config: &EngineConfig,
) -> VenueBreakdowns {
    let demographics: HashMap<&str, (Gender, AgeBand)> = customers
        .iter()
        .map(|c| (c.customer_id.as_str(), (c.gender, c.age_band)))
        .collect();
    let gender_of = |id: &str| demographics.get(id).map_or(Gender::Unspecified, |d| d.0);
    let band_of = |id: &str| demographics.get(id).map_or(AgeBand::Unknown, |d| d.1);

    let mut categories: Tallies<'_, &str> = BTreeMap::new();
    let mut stores: Tallies<'_, &str> = BTreeMap::new();
    let mut slots = SlotTally::new();
    for txn in &snapshot.transactions {
        let venue = txn.venue_id.as_str();
        let customer = txn.customer_id.as_str();
        categories
            .entry(venue)
            .or_default()
            .entry(txn.category.as_str())
            .or_default()
            .add(txn.amount, customer);
        stores
            .entry(venue)
            .or_default()
            .entry(txn.store_id.as_str())
            .or_default()
            .add(txn.amount, customer);
        slots.add(venue, txn);
    }

    VenueBreakdowns {
        by_gender: venue_group_counts(&Gender::ALL, set, gender_of),
        by_age_band: venue_group_counts(&AgeBand::ALL, set, band_of),
        top_categories: rank_labels(categories, config.top_categories, venue_ranked),
        top_stores: rank_labels(stores, config.top_stores, venue_ranked),
        by_day_period: slots
            .periods
            .into_iter()
            .map(|((venue, slot), (value, transactions))| VenueSlot {
                venue_id: venue.to_string(),
                slot,
                value,
                transactions,
            })
            .collect(),
        by_weekday: slots
            .weekdays
            .into_iter()
            .map(|((venue, _), (slot, value, transactions))| VenueSlot {
                venue_id: venue.to_string(),
                slot,
                value,
                transactions,
            })
            .collect(),
    }
}

// ── All tables ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reports {
    pub venues: Vec<VenueSummary>,
    pub profiles: Vec<ProfileSummary>,
    pub profile_venue: Vec<ProfileVenueCell>,
    pub personas: Vec<PersonaSummary>,
    pub high_spenders: HighSpenderComparison,
    pub demographics: DemographicReport,
    pub top_categories: TopCategories,
    pub behavior: ShoppingBehavior,
    pub by_venue: VenueBreakdowns,
}

impl Reports {
    pub fn build(
        snapshot: &Snapshot,
        set: &AggregateSet,
        thresholds: &ThresholdTable,
        rfv: &RfvScores,
        customers: &[CustomerClassification],
        cascade: &PersonaCascade,
        config: &EngineConfig,
    ) -> Self {
        Self {
            venues: venue_summaries(set, thresholds),
            profiles: profile_summaries(customers, set, rfv),
            profile_venue: profile_venue_crosstab(customers, set, rfv),
            personas: persona_summaries(customers, cascade),
            high_spenders: high_spender_comparison(customers),
            demographics: demographics(customers),
            top_categories: top_categories(snapshot, customers, config.top_categories),
            behavior: shopping_behavior(snapshot, customers),
            by_venue: venue_breakdowns(snapshot, set, customers, config),
        }
    }

    /// Table count, for phase logging.
    pub fn rows(&self) -> usize {
        self.venues.len()
            + self.profiles.len()
            + self.profile_venue.len()
            + self.personas.len()
            + self.demographics.matrix.len()
            + self.top_categories.by_gender.len()
            + self.top_categories.by_age_band.len()
            + self.behavior.by_day_period.len()
            + self.behavior.by_weekday.len()
            + self.by_venue.by_gender.len()
            + self.by_venue.by_age_band.len()
            + self.by_venue.top_categories.len()
            + self.by_venue.top_stores.len()
            + self.by_venue.by_day_period.len()
            + self.by_venue.by_weekday.len()
    }
}
