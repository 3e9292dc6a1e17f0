//! Run event log.
//!
//! RULE: Anything a consumer must not miss (excluded records, undefined
//! thresholds, low-confidence venues) is recorded here as well as logged.
//! The log is part of the run output and is persisted with it.

use crate::{
    ledger::RejectReason,
    types::{SnapshotId, VenueId},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run, in emission order.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        snapshot_id: SnapshotId,
        transactions: usize,
        customers: usize,
    },
    RecordsRejected {
        reason: RejectReason,
        count: usize,
    },
    ThresholdUndefined {
        venue_id: VenueId,
        customer_count: usize,
    },
    LowConfidenceVenue {
        venue_id: VenueId,
        customer_count: usize,
        p90_value: Option<f64>,
    },
    PhaseCompleted {
        phase: RunPhase,
        rows: usize,
    },
    RunCompleted {
        snapshot_id: SnapshotId,
        customers: usize,
        venues: usize,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Aggregation,
    Statistics,
    Classification,
    Reports,
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::RecordsRejected { .. } => "records_rejected",
            RunEvent::ThresholdUndefined { .. } => "threshold_undefined",
            RunEvent::LowConfidenceVenue { .. } => "low_confidence_venue",
            RunEvent::PhaseCompleted { .. } => "phase_completed",
            RunEvent::RunCompleted { .. } => "run_completed",
        }
    }
}
