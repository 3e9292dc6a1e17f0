//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

/// A stable customer identifier, as found in the ledger.
pub type CustomerId = String;

/// A venue (shopping centre) identifier.
pub type VenueId = String;

/// The identifier of one immutable ledger snapshot. One engine run per snapshot.
pub type SnapshotId = String;

/// Currency amount. The ledger carries two-decimal values; no rounding is applied.
pub type Money = f64;

/// Label used whenever a categorical attribute is blank in the ledger.
pub const UNSPECIFIED: &str = "Unspecified";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gender {
    Female,
    Male,
    Unspecified,
}

impl Gender {
    /// Parse the free-text gender column of the customer dimension.
    /// Anything unrecognised lands in `Unspecified`; nothing is dropped.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "f" | "female" | "feminino" => Gender::Female,
            "m" | "male" | "masculino" => Gender::Male,
            _ => Gender::Unspecified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
            Gender::Unspecified => "Unspecified",
        }
    }

    pub const ALL: [Gender; 3] = [Gender::Female, Gender::Male, Gender::Unspecified];
}

/// Generational age bands used by the demographic tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeBand {
    #[serde(rename = "16-24 (Gen Z)")]
    GenZ,
    #[serde(rename = "25-39 (Millennials)")]
    Millennials,
    #[serde(rename = "40-54 (Gen X)")]
    GenX,
    #[serde(rename = "55-69 (Boomers)")]
    Boomers,
    #[serde(rename = "70+ (Silent)")]
    Silent,
    #[serde(rename = "Nao Informado")]
    Unknown,
}

impl AgeBand {
    /// Customers under 16 or without a birth date are reported as unknown.
    pub fn of(age: Option<u32>) -> Self {
        match age {
            Some(a) if (16..25).contains(&a) => AgeBand::GenZ,
            Some(a) if (25..40).contains(&a) => AgeBand::Millennials,
            Some(a) if (40..55).contains(&a) => AgeBand::GenX,
            Some(a) if (55..70).contains(&a) => AgeBand::Boomers,
            Some(a) if a >= 70 => AgeBand::Silent,
            _ => AgeBand::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::GenZ => "16-24 (Gen Z)",
            AgeBand::Millennials => "25-39 (Millennials)",
            AgeBand::GenX => "40-54 (Gen X)",
            AgeBand::Boomers => "55-69 (Boomers)",
            AgeBand::Silent => "70+ (Silent)",
            AgeBand::Unknown => "Nao Informado",
        }
    }

    pub const ALL: [AgeBand; 6] = [
        AgeBand::GenZ,
        AgeBand::Millennials,
        AgeBand::GenX,
        AgeBand::Boomers,
        AgeBand::Silent,
        AgeBand::Unknown,
    ];
}

/// Part of the day a purchase happened in (local venue time).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    Morning,   // 06h-12h
    Afternoon, // 12h-18h
    Evening,   // 18h-22h
    Overnight, // 22h-06h
}

impl DayPeriod {
    pub fn of_hour(hour: u32) -> Self {
        match hour {
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            18..=21 => DayPeriod::Evening,
            _ => DayPeriod::Overnight,
        }
    }
}

/// The four-level value profile shared by the value-band and RFV methodologies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Profile {
    #[serde(rename = "VIP")]
    Vip,
    Premium,
    Potencial,
    Pontual,
}

impl Profile {
    /// Ordinal used for monotonicity checks: VIP > Premium > Potencial > Pontual.
    pub fn rank(&self) -> u8 {
        match self {
            Profile::Vip => 4,
            Profile::Premium => 3,
            Profile::Potencial => 2,
            Profile::Pontual => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Profile::Vip => "VIP",
            Profile::Premium => "Premium",
            Profile::Potencial => "Potencial",
            Profile::Pontual => "Pontual",
        }
    }

    /// Highest profile first.
    pub const ALL: [Profile; 4] = [
        Profile::Vip,
        Profile::Premium,
        Profile::Potencial,
        Profile::Pontual,
    ];
}

/// Which value field the value-band classifier reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    Historic,
    Period,
}

/// Population over which a ranking or percentile is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    PerVenue,
}

impl Scope {
    pub fn key(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::PerVenue => "per_venue",
        }
    }
}

/// One of the four profile methodologies the reports are broken down by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Methodology {
    ValueBand { mode: ClassificationMode },
    Rfv { scope: Scope },
}

impl Methodology {
    pub const ALL: [Methodology; 4] = [
        Methodology::ValueBand { mode: ClassificationMode::Historic },
        Methodology::ValueBand { mode: ClassificationMode::Period },
        Methodology::Rfv { scope: Scope::Global },
        Methodology::Rfv { scope: Scope::PerVenue },
    ];

    /// Stable short name, used as a column value in the output store.
    pub fn key(&self) -> &'static str {
        match self {
            Methodology::ValueBand { mode: ClassificationMode::Historic } => "historic",
            Methodology::ValueBand { mode: ClassificationMode::Period } => "period",
            Methodology::Rfv { scope: Scope::Global } => "rfv_global",
            Methodology::Rfv { scope: Scope::PerVenue } => "rfv_per_venue",
        }
    }
}
