//! Threshold calculator: per-venue high-spender cut.
//!
//! A customer is a high spender at a venue iff their value at that venue
//! is >= the venue's percentile threshold. The flag is venue-relative,
//! never global. A venue with zero or one customer has no threshold and
//! therefore no high spenders.

use crate::{
    aggregate::{AggregateSet, CustomerAggregate},
    config::EngineConfig,
    stats::{percentile, PercentileMethod},
    types::{Money, VenueId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VenueThreshold {
    pub venue_id: VenueId,
    pub customer_count: usize,
    /// `None` when the venue population is too small for a percentile.
    pub p90_value: Option<Money>,
    /// Population below `min_confident_population`; the threshold is still
    /// reported but rests on a small sample.
    pub low_confidence: bool,
}

impl VenueThreshold {
    pub fn is_high_spender(&self, venue_value: Money) -> bool {
        self.p90_value.is_some_and(|cut| venue_value >= cut)
    }
}

/// Threshold of one venue from the venue-scoped values of its customers.
pub fn venue_threshold(
    venue_id: &str,
    values: &[Money],
    quantile: f64,
    method: PercentileMethod,
    min_confident_population: usize,
) -> VenueThreshold {
    VenueThreshold {
        venue_id: venue_id.to_string(),
        customer_count: values.len(),
        p90_value: percentile(values, quantile, method),
        low_confidence: values.len() < min_confident_population,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdTable {
    thresholds: BTreeMap<VenueId, VenueThreshold>,
}

impl ThresholdTable {
    pub fn compute(set: &AggregateSet, config: &EngineConfig) -> Self {
        let thresholds = set
            .per_venue
            .iter()
            .map(|(venue_id, rows)| {
                let values: Vec<Money> = rows.iter().map(|r| r.total_value).collect();
                let threshold = venue_threshold(
                    venue_id,
                    &values,
                    config.high_spender_percentile,
                    config.percentile_method,
                    config.min_confident_population,
                );
                (venue_id.clone(), threshold)
            })
            .collect();
        Self { thresholds }
    }

    pub fn get(&self, venue_id: &str) -> Option<&VenueThreshold> {
        self.thresholds.get(venue_id)
    }

    /// Venue-relative high-spender flag for one venue row.
    pub fn is_high_spender(&self, venue_row: &CustomerAggregate) -> bool {
        self.get(&venue_row.dominant_venue)
            .is_some_and(|t| t.is_high_spender(venue_row.total_value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VenueThreshold> {
        self.thresholds.values()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
