//! segmentation-core: customer segmentation and scoring engine.
//!
//! A batch transform over an immutable ledger snapshot. It derives
//! per-venue high-spender thresholds, value-band and RFV profiles in
//! both modes and scopes, and one persona per customer, plus the
//! summary tables the reporting layer reads.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ledger;
pub mod persona;
pub mod report;
pub mod rfv;
pub mod rng;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod threshold;
pub mod types;
pub mod value_band;

pub use config::EngineConfig;
pub use engine::{CustomerClassification, SegmentationEngine, SegmentationRun};
pub use error::{SegError, SegResult};
pub use ledger::Snapshot;
pub use store::SegStore;
