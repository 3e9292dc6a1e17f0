//! Persona classifier: ordered rule cascade, first match wins.
//!
//! RULES:
//!   - The cascade is a flat list of (predicate, persona) pairs evaluated
//!     top to bottom. Evaluation stops at the first predicate that holds.
//!   - The order is configurable but always lists all 14 personas once
//!     and ends with the catch-all "Cliente Regular" (checked by
//!     `EngineConfig::validate`), so every customer gets exactly one persona.
//!   - Age predicates never hold for a customer of unknown age.
//!   - The "Comprador Seletivo" cut is a global lifetime-value percentile
//!     computed once per run in `PersonaContext::compute`, before any
//!     customer is classified.

use crate::{
    aggregate::CustomerAggregate,
    config::{CategoryAffinity, EngineConfig},
    stats::percentile,
    types::{CustomerId, Gender, Money},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Persona {
    #[serde(rename = "Fashionista Premium")]
    FashionistaPremium,
    #[serde(rename = "Executiva Premium")]
    ExecutivaPremium,
    #[serde(rename = "Senior VIP")]
    SeniorVip,
    #[serde(rename = "Executivo Exigente")]
    ExecutivoExigente,
    #[serde(rename = "Cliente Premium")]
    ClientePremium,
    #[serde(rename = "Jovem Engajado")]
    JovemEngajado,
    #[serde(rename = "Mãe Moderna")]
    MaeModerna,
    #[serde(rename = "Beauty Lover")]
    BeautyLover,
    #[serde(rename = "Foodie")]
    Foodie,
    #[serde(rename = "Fitness")]
    Fitness,
    #[serde(rename = "Comprador Seletivo")]
    CompradorSeletivo,
    #[serde(rename = "Senior Tradicional")]
    SeniorTradicional,
    #[serde(rename = "Jovem Explorer")]
    JovemExplorer,
    #[serde(rename = "Cliente Regular")]
    ClienteRegular,
}

impl Persona {
    /// Production priority order.
    pub const CASCADE: [Persona; 14] = [
        Persona::FashionistaPremium,
        Persona::ExecutivaPremium,
        Persona::SeniorVip,
        Persona::ExecutivoExigente,
        Persona::ClientePremium,
        Persona::JovemEngajado,
        Persona::MaeModerna,
        Persona::BeautyLover,
        Persona::Foodie,
        Persona::Fitness,
        Persona::CompradorSeletivo,
        Persona::SeniorTradicional,
        Persona::JovemExplorer,
        Persona::ClienteRegular,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Persona::FashionistaPremium => "Fashionista Premium",
            Persona::ExecutivaPremium => "Executiva Premium",
            Persona::SeniorVip => "Senior VIP",
            Persona::ExecutivoExigente => "Executivo Exigente",
            Persona::ClientePremium => "Cliente Premium",
            Persona::JovemEngajado => "Jovem Engajado",
            Persona::MaeModerna => "Mãe Moderna",
            Persona::BeautyLover => "Beauty Lover",
            Persona::Foodie => "Foodie",
            Persona::Fitness => "Fitness",
            Persona::CompradorSeletivo => "Comprador Seletivo",
            Persona::SeniorTradicional => "Senior Tradicional",
            Persona::JovemExplorer => "Jovem Explorer",
            Persona::ClienteRegular => "Cliente Regular",
        }
    }

    /// The predicate that assigns this persona.
    pub fn predicate(&self) -> Predicate {
        match self {
            Persona::FashionistaPremium => |c, _| {
                c.high_spender && c.gender == Gender::Female && c.age_below(40)
            },
            Persona::ExecutivaPremium => |c, _| {
                c.high_spender && c.gender == Gender::Female && c.age_within(40, 55)
            },
            Persona::SeniorVip => |c, _| c.high_spender && c.age_at_least(55),
            Persona::ExecutivoExigente => |c, _| c.high_spender && c.gender == Gender::Male,
            Persona::ClientePremium => |c, _| c.high_spender,
            Persona::JovemEngajado => |c, _| c.age_below(30) && c.transaction_count >= 5,
            Persona::MaeModerna => |c, ctx| {
                c.gender == Gender::Female
                    && c.age_within(30, 50)
                    && c.transaction_count >= 3
                    && CategoryAffinity::contains(&ctx.affinity.family_fashion, c.dominant_category)
            },
            Persona::BeautyLover => |c, ctx| {
                c.gender == Gender::Female
                    && c.age_within(25, 55)
                    && c.transaction_count >= 3
                    && CategoryAffinity::contains(&ctx.affinity.beauty, c.dominant_category)
            },
            Persona::Foodie => |c, ctx| {
                c.transaction_count >= 3
                    && CategoryAffinity::contains(&ctx.affinity.food, c.dominant_category)
            },
            Persona::Fitness => |c, ctx| {
                c.transaction_count >= 3
                    && CategoryAffinity::contains(&ctx.affinity.sports, c.dominant_category)
            },
            Persona::CompradorSeletivo => |c, ctx| {
                c.transaction_count <= 3
                    && ctx.selective_threshold.is_some_and(|cut| c.total_value >= cut)
            },
            Persona::SeniorTradicional => |c, _| c.age_at_least(55),
            Persona::JovemExplorer => |c, _| c.age_below(30),
            Persona::ClienteRegular => |_, _| true,
        }
    }
}

pub type Predicate = fn(&PersonaInputs<'_>, &PersonaContext<'_>) -> bool;

// ── Inputs ───────────────────────────────────────────────────────────────────

/// Everything a predicate may read about one customer.
#[derive(Debug, Clone)]
pub struct PersonaInputs<'a> {
    /// High-spender flag at the customer's dominant venue.
    pub high_spender: bool,
    pub gender: Gender,
    pub age: Option<u32>,
    pub transaction_count: usize,
    pub dominant_category: &'a str,
    pub total_value: Money,
}

impl<'a> PersonaInputs<'a> {
    pub fn from_aggregate(row: &'a CustomerAggregate, high_spender: bool) -> Self {
        Self {
            high_spender,
            gender: row.gender,
            age: row.age,
            transaction_count: row.transaction_count,
            dominant_category: &row.dominant_category,
            total_value: row.total_value,
        }
    }

    fn age_below(&self, limit: u32) -> bool {
        self.age.is_some_and(|a| a < limit)
    }

    fn age_at_least(&self, limit: u32) -> bool {
        self.age.is_some_and(|a| a >= limit)
    }

    fn age_within(&self, low: u32, high: u32) -> bool {
        self.age.is_some_and(|a| a >= low && a < high)
    }
}

/// Run-scoped statistics shared read-only by every classification.
#[derive(Debug, Clone)]
pub struct PersonaContext<'a> {
    /// Global lifetime-value percentile; `None` leaves "Comprador Seletivo" unreachable.
    pub selective_threshold: Option<Money>,
    pub affinity: &'a CategoryAffinity,
}

impl<'a> PersonaContext<'a> {
    pub fn compute(global: &[CustomerAggregate], config: &'a EngineConfig) -> Self {
        let values: Vec<Money> = global.iter().map(|r| r.total_value).collect();
        let selective_threshold = percentile(
            &values,
            config.selective_buyer_percentile,
            config.percentile_method,
        );
        Self {
            selective_threshold,
            affinity: &config.category_affinity,
        }
    }
}

// ── Cascade ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaAssignment {
    pub customer_id: CustomerId,
    pub persona: Persona,
}

#[derive(Clone)]
pub struct PersonaCascade {
    rules: Vec<(Predicate, Persona)>,
}

impl PersonaCascade {
    /// Build from a validated order.
    pub fn new(order: &[Persona]) -> Self {
        Self {
            rules: order.iter().map(|p| (p.predicate(), *p)).collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.persona_cascade)
    }

    pub fn classify(&self, inputs: &PersonaInputs<'_>, ctx: &PersonaContext<'_>) -> Persona {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate(inputs, ctx))
            .map(|(_, persona)| *persona)
            .unwrap_or(Persona::ClienteRegular)
    }

    pub fn order(&self) -> impl Iterator<Item = Persona> + '_ {
        self.rules.iter().map(|(_, p)| *p)
    }

    /// Position of a persona in this cascade; used to order reports.
    pub fn priority(&self, persona: Persona) -> usize {
        self.rules
            .iter()
            .position(|(_, p)| *p == persona)
            .unwrap_or(self.rules.len())
    }
}

impl std::fmt::Debug for PersonaCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.order().map(|p| p.label())).finish()
    }
}
