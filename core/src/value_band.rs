//! Value-band classifier: fixed monetary cut points, no dependency between
//! customers. One function serves both modes; the mode only selects the
//! value field and the band table.

use crate::{
    aggregate::CustomerAggregate,
    config::{BandTable, EngineConfig},
    types::{ClassificationMode, CustomerId, Money, Profile},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueBandProfile {
    pub customer_id: CustomerId,
    pub classification_mode: ClassificationMode,
    pub profile: Profile,
}

/// Which aggregate field a mode reads.
pub fn value_for(mode: ClassificationMode, row: &CustomerAggregate) -> Money {
    match mode {
        ClassificationMode::Historic => row.total_value,
        ClassificationMode::Period => row.period_value,
    }
}

/// Inclusive-lower, exclusive-upper bands; VIP is unbounded above.
pub fn band_for(value: Money, bands: &BandTable) -> Profile {
    if value >= bands.vip_from {
        Profile::Vip
    } else if value >= bands.premium_from {
        Profile::Premium
    } else if value >= bands.potencial_from {
        Profile::Potencial
    } else {
        Profile::Pontual
    }
}

pub fn classify(
    row: &CustomerAggregate,
    mode: ClassificationMode,
    config: &EngineConfig,
) -> ValueBandProfile {
    ValueBandProfile {
        customer_id: row.customer_id.clone(),
        classification_mode: mode,
        profile: band_for(value_for(mode, row), config.bands(mode)),
    }
}

pub fn classify_population(
    rows: &[CustomerAggregate],
    mode: ClassificationMode,
    config: &EngineConfig,
) -> Vec<ValueBandProfile> {
    rows.iter().map(|row| classify(row, mode, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historic_boundaries_belong_to_the_upper_band() {
        let bands = EngineConfig::standard().historic_bands;
        assert_eq!(band_for(5000.0, &bands), Profile::Vip);
        assert_eq!(band_for(4999.99, &bands), Profile::Premium);
        assert_eq!(band_for(2500.0, &bands), Profile::Premium);
        assert_eq!(band_for(2499.99, &bands), Profile::Potencial);
        assert_eq!(band_for(1000.0, &bands), Profile::Potencial);
        assert_eq!(band_for(999.99, &bands), Profile::Pontual);
    }

    #[test]
    fn population_is_classified_row_by_row() {
        use crate::{aggregate::aggregate, ledger::{Snapshot, Transaction}};
        use chrono::NaiveDate;

        let at = NaiveDate::from_ymd_opt(2024, 4, 2)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        let txn = |customer: &str, amount: f64| Transaction {
            customer_id: customer.into(),
            venue_id: "V".into(),
            amount,
            timestamp: at,
            category: "Home".into(),
            store_id: "V-L01".into(),
        };
        let snapshot = Snapshot {
            snapshot_id: "bands".into(),
            transactions: vec![txn("A", 1200.0), txn("B", 7000.0), txn("A", 1400.0)],
            ..Snapshot::default()
        };
        let config = EngineConfig::standard();
        let set = aggregate(&snapshot, &config);

        let rows = classify_population(&set.global, ClassificationMode::Historic, &config);
        let profiles: Vec<(&str, Profile)> =
            rows.iter().map(|r| (r.customer_id.as_str(), r.profile)).collect();
        assert_eq!(profiles, vec![("A", Profile::Premium), ("B", Profile::Vip)]);
        assert!(rows.iter().all(|r| r.classification_mode == ClassificationMode::Historic));
    }

    #[test]
    fn period_bands_use_their_own_cut_points() {
        let bands = EngineConfig::standard().period_bands;
        assert_eq!(band_for(2000.0, &bands), Profile::Vip);
        assert_eq!(band_for(1999.99, &bands), Profile::Premium);
        assert_eq!(band_for(500.0, &bands), Profile::Potencial);
        assert_eq!(band_for(499.99, &bands), Profile::Pontual);
    }
}
