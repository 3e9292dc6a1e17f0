use crate::{
    error::{SegError, SegResult},
    persona::Persona,
    stats::PercentileMethod,
    types::{ClassificationMode, Money, Profile},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lowest and highest total RFV score (three dimensions scored 1..=5).
pub const MIN_TOTAL_SCORE: u8 = 3;
pub const MAX_TOTAL_SCORE: u8 = 15;

// ── Value bands ────────────────────────────────────────────────────

/// Fixed monetary cut points. Bands are `[low, high)`; VIP is unbounded above.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandTable {
    pub vip_from: Money,
    pub premium_from: Money,
    pub potencial_from: Money,
}

impl BandTable {
    fn validate(&self, name: &str) -> SegResult<()> {
        let cuts = [self.vip_from, self.premium_from, self.potencial_from];
        if cuts.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(SegError::config(format!(
                "{name}: cut points must be finite and positive, got {cuts:?}"
            )));
        }
        if !(self.vip_from > self.premium_from && self.premium_from > self.potencial_from) {
            return Err(SegError::config(format!(
                "{name}: cut points must be strictly descending (vip > premium > potencial), got {cuts:?}"
            )));
        }
        Ok(())
    }
}

// ── RFV profile bands ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBand {
    pub profile: Profile,
    pub min_score: u8,
    pub max_score: u8,
}

// ── Period window ──────────────────────────────────────────────────

/// Inclusive calendar window selecting the "period" transactions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PeriodWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodWindow {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = at.date();
        day >= self.start && day <= self.end
    }
}

// ── Category affinity ──────────────────────────────────────────────

/// Ledger category labels grouped by the persona predicates that read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryAffinity {
    pub family_fashion: Vec<String>,
    pub beauty: Vec<String>,
    pub food: Vec<String>,
    pub sports: Vec<String>,
}

impl CategoryAffinity {
    /// Case-insensitive, whitespace-trimmed membership test.
    pub fn contains(group: &[String], category: &str) -> bool {
        let category = category.trim();
        group.iter().any(|g| g.trim().eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Percentile of venue-scoped value at or above which a customer is a high spender.
    pub high_spender_percentile: f64,
    /// Global lifetime-value percentile used by the "Comprador Seletivo" rule.
    pub selective_buyer_percentile: f64,
    pub percentile_method: PercentileMethod,
    /// Venues with fewer customers than this are flagged low-confidence.
    pub min_confident_population: usize,
    pub historic_bands: BandTable,
    pub period_bands: BandTable,
    pub rfv_profile_bands: Vec<ScoreBand>,
    #[serde(default)]
    pub period: Option<PeriodWindow>,
    /// Date ages are computed at. Defaults to the latest transaction date,
    /// never the wall clock.
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
    pub persona_cascade: Vec<Persona>,
    pub category_affinity: CategoryAffinity,
    pub top_categories: usize,
    /// Rows per venue in the top-stores table.
    #[serde(default = "default_top_stores")]
    pub top_stores: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_top_stores() -> usize {
    10
}

fn default_parallel() -> bool {
    true
}

impl EngineConfig {
    /// Load from a JSON file and validate it.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(Self::from_json_str(&content)?)
    }

    /// Parse and validate. Missing keys are configuration errors.
    pub fn from_json_str(content: &str) -> SegResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)
            .map_err(|e| SegError::config(format!("cannot parse engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Documented production defaults.
    pub fn standard() -> Self {
        Self {
            high_spender_percentile: 0.90,
            selective_buyer_percentile: 0.75,
            percentile_method: PercentileMethod::Linear,
            min_confident_population: 10,
            historic_bands: BandTable {
                vip_from: 5000.0,
                premium_from: 2500.0,
                potencial_from: 1000.0,
            },
            period_bands: BandTable {
                vip_from: 2000.0,
                premium_from: 1000.0,
                potencial_from: 500.0,
            },
            rfv_profile_bands: vec![
                ScoreBand { profile: Profile::Vip, min_score: 13, max_score: 15 },
                ScoreBand { profile: Profile::Premium, min_score: 10, max_score: 12 },
                ScoreBand { profile: Profile::Potencial, min_score: 7, max_score: 9 },
                ScoreBand { profile: Profile::Pontual, min_score: 3, max_score: 6 },
            ],
            period: None,
            reference_date: None,
            persona_cascade: Persona::CASCADE.to_vec(),
            category_affinity: CategoryAffinity {
                family_fashion: vec!["Fashion".into(), "Children's".into(), "Footwear".into()],
                beauty: vec!["Beauty".into()],
                food: vec!["Food/Dining".into()],
                sports: vec!["Sports".into()],
            },
            top_categories: 5,
            top_stores: default_top_stores(),
            parallel: true,
        }
    }

    pub fn bands(&self, mode: ClassificationMode) -> &BandTable {
        match mode {
            ClassificationMode::Historic => &self.historic_bands,
            ClassificationMode::Period => &self.period_bands,
        }
    }

    /// Profile for a total RFV score. `None` only for scores outside 3..=15.
    pub fn profile_for_score(&self, total_score: u8) -> Option<Profile> {
        self.rfv_profile_bands
            .iter()
            .find(|b| total_score >= b.min_score && total_score <= b.max_score)
            .map(|b| b.profile)
    }

    /// Reject anything that would silently produce wrong classifications.
    pub fn validate(&self) -> SegResult<()> {
        for (name, q) in [
            ("high_spender_percentile", self.high_spender_percentile),
            ("selective_buyer_percentile", self.selective_buyer_percentile),
        ] {
            if !(q > 0.0 && q < 1.0) {
                return Err(SegError::config(format!(
                    "{name} must lie strictly between 0 and 1, got {q}"
                )));
            }
        }

        self.historic_bands.validate("historic_bands")?;
        self.period_bands.validate("period_bands")?;

        // Every total score must map to exactly one profile.
        for score in MIN_TOTAL_SCORE..=MAX_TOTAL_SCORE {
            let hits = self
                .rfv_profile_bands
                .iter()
                .filter(|b| score >= b.min_score && score <= b.max_score)
                .count();
            if hits != 1 {
                return Err(SegError::config(format!(
                    "rfv_profile_bands must cover total score {score} exactly once, found {hits}"
                )));
            }
        }
        if let Some(b) = self
            .rfv_profile_bands
            .iter()
            .find(|b| b.min_score > b.max_score || b.min_score < MIN_TOTAL_SCORE || b.max_score > MAX_TOTAL_SCORE)
        {
            return Err(SegError::config(format!(
                "rfv band for {} has invalid range {}..={}",
                b.profile.label(),
                b.min_score,
                b.max_score
            )));
        }

        // A higher score range never maps to a lower profile.
        for high in &self.rfv_profile_bands {
            if let Some(low) = self
                .rfv_profile_bands
                .iter()
                .find(|low| low.max_score < high.min_score && low.profile.rank() > high.profile.rank())
            {
                return Err(SegError::config(format!(
                    "rfv bands are not monotonic: {}..={} maps to {} but lower scores {}..={} map to {}",
                    high.min_score,
                    high.max_score,
                    high.profile.label(),
                    low.min_score,
                    low.max_score,
                    low.profile.label()
                )));
            }
        }

        self.validate_cascade()?;

        if let Some(window) = &self.period {
            if window.start > window.end {
                return Err(SegError::config(format!(
                    "period window starts after it ends ({} > {})",
                    window.start, window.end
                )));
            }
        }

        let affinity = &self.category_affinity;
        for (name, group) in [
            ("family_fashion", &affinity.family_fashion),
            ("beauty", &affinity.beauty),
            ("food", &affinity.food),
            ("sports", &affinity.sports),
        ] {
            if group.iter().all(|c| c.trim().is_empty()) {
                return Err(SegError::config(format!(
                    "category_affinity.{name} must name at least one category"
                )));
            }
        }

        if self.top_categories == 0 {
            return Err(SegError::config("top_categories must be at least 1"));
        }
        if self.top_stores == 0 {
            return Err(SegError::config("top_stores must be at least 1"));
        }
        Ok(())
    }

    fn validate_cascade(&self) -> SegResult<()> {
        let cascade = &self.persona_cascade;
        if cascade.len() != Persona::CASCADE.len() {
            return Err(SegError::config(format!(
                "persona_cascade must list all {} personas, got {}",
                Persona::CASCADE.len(),
                cascade.len()
            )));
        }
        let distinct: HashSet<_> = cascade.iter().collect();
        if distinct.len() != cascade.len() {
            return Err(SegError::config("persona_cascade lists a persona more than once"));
        }
        if cascade.last() != Some(&Persona::ClienteRegular) {
            return Err(SegError::config(format!(
                "persona_cascade must end with the catch-all \"{}\"",
                Persona::ClienteRegular.label()
            )));
        }
        Ok(())
    }
}
