//! The segmentation engine: one batch transform per snapshot.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   0. Aggregation    snapshot -> global and per-venue customer rows
//!   1. Statistics     venue thresholds, the selective-buyer cut and
//!                     every quantile ranking (Global and PerVenue)
//!   2. Classification one row per customer: value bands, RFV profiles,
//!                     high-spender flag, persona
//!   3. Reports        summaries, crosstabs, demographic tables
//!
//! RULES:
//!   - Phase 1 statistics are complete and read-only before phase 2 starts.
//!   - Phase 2 classifies each customer independently; with `parallel`
//!     it runs on rayon and collects in input order, so the output is
//!     identical to the sequential path.
//!   - Nothing reads the wall clock or draws random numbers.
//!   - A run either returns every table or an error. Never half a run.

use crate::{
    aggregate::{aggregate, AggregateSet, CustomerAggregate},
    config::EngineConfig,
    error::{SegError, SegResult},
    event::{RunEvent, RunPhase},
    ledger::{IngestReport, Snapshot},
    persona::{Persona, PersonaAssignment, PersonaCascade, PersonaContext, PersonaInputs},
    report::Reports,
    rfv::{RfvScore, RfvScores},
    threshold::{ThresholdTable, VenueThreshold},
    types::{AgeBand, ClassificationMode, CustomerId, Gender, Methodology, Money, Profile, Scope, SnapshotId, VenueId},
    value_band::{self, ValueBandProfile},
};
use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The per-customer output row read by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerClassification {
    pub customer_id:       CustomerId,
    pub dominant_venue:    VenueId,
    pub gender:            Gender,
    pub age:               Option<u32>,
    pub age_band:          AgeBand,
    pub total_value:       Money,
    pub period_value:      Money,
    pub transaction_count: usize,
    pub first_purchase_at: NaiveDateTime,
    pub last_purchase_at:  NaiveDateTime,
    pub dominant_category: String,
    pub dominant_store:    String,
    /// Value at the dominant venue.
    pub venue_value:       Money,
    /// High spender at the dominant venue.
    pub high_spender:      bool,
    pub historic_profile:  Profile,
    pub period_profile:    Profile,
    // Global RFV
    pub recency_score:     u8,
    pub frequency_score:   u8,
    pub value_score:       u8,
    pub total_score:       u8,
    pub rfv_profile:       Profile,
    // PerVenue RFV at the dominant venue
    pub venue_total_score: u8,
    pub venue_rfv_profile: Profile,
    pub persona:           Persona,
}

impl CustomerClassification {
    pub fn profile(&self, methodology: Methodology) -> Profile {
        match methodology {
            Methodology::ValueBand { mode: ClassificationMode::Historic } => self.historic_profile,
            Methodology::ValueBand { mode: ClassificationMode::Period } => self.period_profile,
            Methodology::Rfv { scope: Scope::Global } => self.rfv_profile,
            Methodology::Rfv { scope: Scope::PerVenue } => self.venue_rfv_profile,
        }
    }

    /// The value a methodology ranks or bands this customer by.
    pub fn value_for(&self, methodology: Methodology) -> Money {
        match methodology {
            Methodology::ValueBand { mode: ClassificationMode::Period } => self.period_value,
            Methodology::Rfv { scope: Scope::PerVenue } => self.venue_value,
            _ => self.total_value,
        }
    }
}

/// Everything one run produces. Serializes deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationRun {
    pub snapshot_id:    SnapshotId,
    pub reference_date: Option<NaiveDate>,
    pub customers:      Vec<CustomerClassification>,
    pub rfv:            RfvScores,
    pub thresholds:     Vec<VenueThreshold>,
    /// Global lifetime-value cut used by "Comprador Seletivo".
    pub selective_threshold: Option<Money>,
    pub reports:        Reports,
    pub ingest:         IngestReport,
    pub events:         Vec<RunEvent>,
}

impl SegmentationRun {
    pub fn to_json(&self) -> SegResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn value_band_profiles(&self, mode: ClassificationMode) -> Vec<ValueBandProfile> {
        self.customers
            .iter()
            .map(|c| ValueBandProfile {
                customer_id: c.customer_id.clone(),
                classification_mode: mode,
                profile: c.profile(Methodology::ValueBand { mode }),
            })
            .collect()
    }

    pub fn persona_assignments(&self) -> Vec<PersonaAssignment> {
        self.customers
            .iter()
            .map(|c| PersonaAssignment {
                customer_id: c.customer_id.clone(),
                persona: c.persona,
            })
            .collect()
    }

    pub fn customer(&self, customer_id: &str) -> Option<&CustomerClassification> {
        self.customers
            .binary_search_by(|c| c.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|idx| &self.customers[idx])
    }
}

/// Read-only phase-1 output shared by every phase-2 classification.
struct RunStatistics<'a> {
    set: AggregateSet,
    thresholds: ThresholdTable,
    rfv: RfvScores,
    persona_ctx: PersonaContext<'a>,
}

pub struct SegmentationEngine {
    config: EngineConfig,
    cascade: PersonaCascade,
}

impl SegmentationEngine {
    /// Refuses to build on an invalid configuration.
    pub fn new(config: EngineConfig) -> SegResult<Self> {
        config.validate()?;
        let cascade = PersonaCascade::from_config(&config);
        Ok(Self { config, cascade })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cascade(&self) -> &PersonaCascade {
        &self.cascade
    }

    pub fn run(&self, snapshot: &Snapshot) -> SegResult<SegmentationRun> {
        log::info!(
            "run {}: {} transactions, {} customer records",
            snapshot.snapshot_id,
            snapshot.transactions.len(),
            snapshot.customers.len()
        );

        let mut events = vec![RunEvent::RunStarted {
            snapshot_id: snapshot.snapshot_id.clone(),
            transactions: snapshot.transactions.len(),
            customers: snapshot.customers.len(),
        }];
        for (reason, count) in &snapshot.report.rejections {
            events.push(RunEvent::RecordsRejected {
                reason: *reason,
                count: *count,
            });
        }

        // Phase 0
        let set = aggregate(snapshot, &self.config);
        events.push(RunEvent::PhaseCompleted {
            phase: RunPhase::Aggregation,
            rows: set.global.len(),
        });

        // Phase 1
        let stats = self.statistics(set, &mut events)?;

        // Phase 2
        let customers = self.classify_all(&stats)?;
        events.push(RunEvent::PhaseCompleted {
            phase: RunPhase::Classification,
            rows: customers.len(),
        });

        // Phase 3
        let reports = Reports::build(
            snapshot,
            &stats.set,
            &stats.thresholds,
            &stats.rfv,
            &customers,
            &self.cascade,
            &self.config,
        );
        events.push(RunEvent::PhaseCompleted {
            phase: RunPhase::Reports,
            rows: reports.rows(),
        });

        events.push(RunEvent::RunCompleted {
            snapshot_id: snapshot.snapshot_id.clone(),
            customers: customers.len(),
            venues: stats.thresholds.len(),
        });
        log::info!(
            "run {} complete: {} customers across {} venues, {} record(s) excluded",
            snapshot.snapshot_id,
            customers.len(),
            stats.thresholds.len(),
            snapshot.report.excluded()
        );

        Ok(SegmentationRun {
            snapshot_id: snapshot.snapshot_id.clone(),
            reference_date: stats.set.reference_date,
            customers,
            selective_threshold: stats.persona_ctx.selective_threshold,
            thresholds: stats.thresholds.iter().cloned().collect(),
            rfv: stats.rfv,
            reports,
            ingest: snapshot.report.clone(),
            events,
        })
    }

    // ── Phase 1 ──────────────────────────────────────────────────────────────

    fn statistics<'a>(
        &'a self,
        set: AggregateSet,
        events: &mut Vec<RunEvent>,
    ) -> SegResult<RunStatistics<'a>> {
        let thresholds = ThresholdTable::compute(&set, &self.config);
        for t in thresholds.iter() {
            if t.p90_value.is_none() {
                log::warn!(
                    "venue {}: {} customer(s), threshold undefined; no high spenders",
                    t.venue_id,
                    t.customer_count
                );
                events.push(RunEvent::ThresholdUndefined {
                    venue_id: t.venue_id.clone(),
                    customer_count: t.customer_count,
                });
            } else if t.low_confidence {
                log::warn!(
                    "venue {}: threshold {:?} rests on only {} customer(s)",
                    t.venue_id,
                    t.p90_value,
                    t.customer_count
                );
                events.push(RunEvent::LowConfidenceVenue {
                    venue_id: t.venue_id.clone(),
                    customer_count: t.customer_count,
                    p90_value: t.p90_value,
                });
            }
        }

        let persona_ctx = PersonaContext::compute(&set.global, &self.config);
        if persona_ctx.selective_threshold.is_none() {
            log::warn!("selective-buyer percentile undefined; rule never fires this run");
        }
        let rfv = RfvScores::compute(&set, &self.config)?;

        log::debug!(
            "statistics: {} venue thresholds, selective cut {:?}",
            thresholds.len(),
            persona_ctx.selective_threshold
        );
        events.push(RunEvent::PhaseCompleted {
            phase: RunPhase::Statistics,
            rows: thresholds.len(),
        });

        Ok(RunStatistics {
            set,
            thresholds,
            rfv,
            persona_ctx,
        })
    }

    // ── Phase 2 ──────────────────────────────────────────────────────────────

    fn classify_all(&self, stats: &RunStatistics<'_>) -> SegResult<Vec<CustomerClassification>> {
        let rows = &stats.set.global;
        let scores = &stats.rfv.global;
        if rows.len() != scores.len() {
            return Err(SegError::Other(anyhow::anyhow!(
                "global rfv scores ({}) out of step with customers ({})",
                scores.len(),
                rows.len()
            )));
        }

        if self.config.parallel {
            rows.par_iter()
                .zip(scores.par_iter())
                .map(|(row, score)| self.classify_customer(row, score, stats))
                .collect()
        } else {
            rows.iter()
                .zip(scores.iter())
                .map(|(row, score)| self.classify_customer(row, score, stats))
                .collect()
        }
    }

    fn classify_customer(
        &self,
        row: &CustomerAggregate,
        global_score: &RfvScore,
        stats: &RunStatistics<'_>,
    ) -> SegResult<CustomerClassification> {
        let venue_row = stats
            .set
            .at_venue(&row.customer_id, &row.dominant_venue)
            .ok_or_else(|| missing(&row.customer_id, &row.dominant_venue, "aggregate"))?;
        let venue_score = stats
            .rfv
            .venue_for(&row.customer_id, &row.dominant_venue)
            .ok_or_else(|| missing(&row.customer_id, &row.dominant_venue, "rfv score"))?;

        let high_spender = stats.thresholds.is_high_spender(venue_row);
        let persona = self.cascade.classify(
            &PersonaInputs::from_aggregate(row, high_spender),
            &stats.persona_ctx,
        );

        Ok(CustomerClassification {
            customer_id:       row.customer_id.clone(),
            dominant_venue:    row.dominant_venue.clone(),
            gender:            row.gender,
            age:               row.age,
            age_band:          row.age_band(),
            total_value:       row.total_value,
            period_value:      row.period_value,
            transaction_count: row.transaction_count,
            first_purchase_at: row.first_purchase_at,
            last_purchase_at:  row.last_purchase_at,
            dominant_category: row.dominant_category.clone(),
            dominant_store:    row.dominant_store.clone(),
            venue_value:       venue_row.total_value,
            high_spender,
            historic_profile:  value_band::classify(row, ClassificationMode::Historic, &self.config).profile,
            period_profile:    value_band::classify(row, ClassificationMode::Period, &self.config).profile,
            recency_score:     global_score.recency_score,
            frequency_score:   global_score.frequency_score,
            value_score:       global_score.value_score,
            total_score:       global_score.total_score,
            rfv_profile:       global_score.profile,
            venue_total_score: venue_score.total_score,
            venue_rfv_profile: venue_score.profile,
            persona,
        })
    }
}

fn missing(customer_id: &str, venue_id: &str, what: &str) -> SegError {
    SegError::Other(anyhow::anyhow!(
        "customer {customer_id} has no {what} at dominant venue {venue_id}"
    ))
}
