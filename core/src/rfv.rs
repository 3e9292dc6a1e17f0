//! Quantile scorer: Recency / Frequency / Value scores 1..=5 by
//! equal-population binning, in Global or PerVenue scope.
//!
//! Each dimension is ranked independently with tie-grouping (see
//! `stats::quantile_scores`). The composite profile is a pure function
//! of the summed score, so equal totals always share a profile within a
//! scope. Scores in different scopes are expected to diverge.
//!
//! A venue with fewer than five customers still scores 1..=5: its
//! customers are spread across the range with the best of them on 5, so
//! a sole customer scores 15. That is reduced discriminative power, not
//! an error.

use crate::{
    aggregate::{AggregateSet, CustomerAggregate},
    config::EngineConfig,
    error::{SegError, SegResult},
    stats::quantile_scores,
    types::{CustomerId, Profile, Scope, VenueId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const QUINTILES: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RfvScore {
    pub customer_id: CustomerId,
    pub scope: Scope,
    /// Ranked venue for PerVenue scores; `None` in Global scope.
    pub venue_id: Option<VenueId>,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub value_score: u8,
    pub total_score: u8,
    pub profile: Profile,
}

/// Score one ranking population.
pub fn score_population(
    rows: &[CustomerAggregate],
    scope: Scope,
    config: &EngineConfig,
) -> SegResult<Vec<RfvScore>> {
    if !rows.is_empty() && rows.len() < QUINTILES as usize {
        log::debug!(
            "rfv: {:?} population of {} customer(s) is smaller than {} bins",
            scope,
            rows.len(),
            QUINTILES
        );
    }

    let recency = quantile_scores(rows, QUINTILES, |a, b| {
        a.last_purchase_at.cmp(&b.last_purchase_at)
    });
    let frequency = quantile_scores(rows, QUINTILES, |a, b| {
        a.transaction_count.cmp(&b.transaction_count)
    });
    let value = quantile_scores(rows, QUINTILES, |a, b| a.total_value.total_cmp(&b.total_value));

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let total_score = recency[i] + frequency[i] + value[i];
            let profile = config.profile_for_score(total_score).ok_or_else(|| {
                SegError::config(format!("no rfv profile band covers total score {total_score}"))
            })?;
            Ok(RfvScore {
                customer_id: row.customer_id.clone(),
                scope,
                venue_id: match scope {
                    Scope::Global => None,
                    Scope::PerVenue => Some(row.dominant_venue.clone()),
                },
                recency_score: recency[i],
                frequency_score: frequency[i],
                value_score: value[i],
                total_score,
                profile,
            })
        })
        .collect()
}

/// Scores for both scopes, aligned with the aggregate set's row order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RfvScores {
    pub global: Vec<RfvScore>,
    pub per_venue: BTreeMap<VenueId, Vec<RfvScore>>,
}

impl RfvScores {
    pub fn compute(set: &AggregateSet, config: &EngineConfig) -> SegResult<Self> {
        let global = score_population(&set.global, Scope::Global, config)?;
        let per_venue = set
            .per_venue
            .iter()
            .map(|(venue_id, rows)| {
                Ok((venue_id.clone(), score_population(rows, Scope::PerVenue, config)?))
            })
            .collect::<SegResult<BTreeMap<_, _>>>()?;
        Ok(Self { global, per_venue })
    }

    pub fn scope(&self, scope: Scope) -> Vec<&RfvScore> {
        match scope {
            Scope::Global => self.global.iter().collect(),
            Scope::PerVenue => self.per_venue.values().flatten().collect(),
        }
    }

    pub fn global_for(&self, customer_id: &str) -> Option<&RfvScore> {
        find(&self.global, customer_id)
    }

    pub fn venue_for(&self, customer_id: &str, venue_id: &str) -> Option<&RfvScore> {
        self.per_venue
            .get(venue_id)
            .and_then(|scores| find(scores, customer_id))
    }
}

fn find<'a>(scores: &'a [RfvScore], customer_id: &str) -> Option<&'a RfvScore> {
    scores
        .binary_search_by(|s| s.customer_id.as_str().cmp(customer_id))
        .ok()
        .map(|idx| &scores[idx])
}
