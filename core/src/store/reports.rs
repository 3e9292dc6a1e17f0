use super::{from_label, label_of, SegStore};
use crate::{
    engine::SegmentationRun,
    error::SegResult,
    event::RunEvent,
    persona::Persona,
    report::{ProfileVenueCell, VenueSummary},
    types::{Methodology, Profile},
};
use rusqlite::{params, OptionalExtension};

/// Names of the supplementary tables stored as JSON documents.
pub const DOC_HIGH_SPENDERS: &str = "high_spenders";
pub const DOC_DEMOGRAPHICS: &str = "demographics";
pub const DOC_TOP_CATEGORIES: &str = "top_categories";
pub const DOC_BEHAVIOR: &str = "behavior";
pub const DOC_VENUE_BREAKDOWNS: &str = "venue_breakdowns";
pub const DOC_INGEST: &str = "ingest_report";

impl SegStore {
    pub(super) fn insert_reports(&self, run: &SegmentationRun) -> SegResult<()> {
        let id = &run.snapshot_id;
        let reports = &run.reports;

        for v in &reports.venues {
            self.conn.execute(
                "INSERT INTO venue_summary (
                    snapshot_id, venue_id, customers, total_value, mean_ticket,
                    p90_value, low_confidence, high_spenders, high_spender_value
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    v.venue_id,
                    v.customers as i64,
                    v.total_value,
                    v.mean_ticket,
                    v.p90_value,
                    v.low_confidence as i64,
                    v.high_spenders as i64,
                    v.high_spender_value,
                ],
            )?;
        }

        for p in &reports.profiles {
            self.conn.execute(
                "INSERT INTO profile_summary (
                    snapshot_id, methodology, profile, customers, value,
                    mean_ticket, customer_share, value_share
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    p.methodology.key(),
                    label_of(&p.profile)?,
                    p.customers as i64,
                    p.value,
                    p.mean_ticket,
                    p.customer_share,
                    p.value_share,
                ],
            )?;
        }

        for cell in &reports.profile_venue {
            self.conn.execute(
                "INSERT INTO profile_venue (
                    snapshot_id, methodology, profile, venue_id, customers, value, mean_ticket
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    cell.methodology.key(),
                    label_of(&cell.profile)?,
                    cell.venue_id,
                    cell.customers as i64,
                    cell.value,
                    cell.mean_ticket,
                ],
            )?;
        }

        for (position, p) in reports.personas.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO persona_summary (
                    snapshot_id, persona, position, customers, value, mean_ticket,
                    mean_frequency, mean_age, customer_share, value_share
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    label_of(&p.persona)?,
                    position as i64,
                    p.customers as i64,
                    p.value,
                    p.mean_ticket,
                    p.mean_frequency,
                    p.mean_age,
                    p.customer_share,
                    p.value_share,
                ],
            )?;
        }

        let documents = [
            (DOC_HIGH_SPENDERS, serde_json::to_string(&reports.high_spenders)?),
            (DOC_DEMOGRAPHICS, serde_json::to_string(&reports.demographics)?),
            (DOC_TOP_CATEGORIES, serde_json::to_string(&reports.top_categories)?),
            (DOC_BEHAVIOR, serde_json::to_string(&reports.behavior)?),
            (DOC_VENUE_BREAKDOWNS, serde_json::to_string(&reports.by_venue)?),
            (DOC_INGEST, serde_json::to_string(&run.ingest)?),
        ];
        for (name, payload) in documents {
            self.conn.execute(
                "INSERT INTO report_document (snapshot_id, name, payload) VALUES (?1, ?2, ?3)",
                params![id, name, payload],
            )?;
        }
        Ok(())
    }

    pub(super) fn insert_events(&self, run: &SegmentationRun) -> SegResult<()> {
        for (seq, event) in run.events.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO event_log (snapshot_id, seq, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.snapshot_id,
                    seq as i64,
                    event.event_type(),
                    serde_json::to_string(event)?,
                ],
            )?;
        }
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn venue_summaries(&self, snapshot_id: &str) -> SegResult<Vec<VenueSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT venue_id, customers, total_value, mean_ticket, p90_value,
                    low_confidence, high_spenders, high_spender_value
             FROM venue_summary WHERE snapshot_id = ?1
             ORDER BY venue_id ASC",
        )?;
        let rows = stmt
            .query_map(params![snapshot_id], |row| {
                Ok(VenueSummary {
                    venue_id: row.get(0)?,
                    customers: row.get::<_, i64>(1)? as usize,
                    total_value: row.get(2)?,
                    mean_ticket: row.get(3)?,
                    p90_value: row.get(4)?,
                    low_confidence: row.get::<_, i64>(5)? != 0,
                    high_spenders: row.get::<_, i64>(6)? as usize,
                    high_spender_value: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Persona counts in summary order (count desc, then cascade order).
    pub fn persona_counts(&self, snapshot_id: &str) -> SegResult<Vec<(Persona, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT persona, customers FROM persona_summary
             WHERE snapshot_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map(params![snapshot_id], |row| {
                Ok((from_label(0, row.get(0)?)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Customer count per profile under one methodology, highest profile first.
    pub fn profile_counts(
        &self,
        snapshot_id: &str,
        methodology: Methodology,
    ) -> SegResult<Vec<(Profile, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT profile, customers FROM profile_summary
             WHERE snapshot_id = ?1 AND methodology = ?2",
        )?;
        let mut rows: Vec<(Profile, usize)> = stmt
            .query_map(params![snapshot_id, methodology.key()], |row| {
                Ok((from_label(0, row.get(0)?)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by_key(|(profile, _)| std::cmp::Reverse(profile.rank()));
        Ok(rows)
    }

    /// One methodology's profile × venue crosstab, in profile then venue order.
    pub fn profile_venue_cells(
        &self,
        snapshot_id: &str,
        methodology: Methodology,
    ) -> SegResult<Vec<ProfileVenueCell>> {
        let mut stmt = self.conn.prepare(
            "SELECT profile, venue_id, customers, value, mean_ticket
             FROM profile_venue WHERE snapshot_id = ?1 AND methodology = ?2
             ORDER BY venue_id ASC",
        )?;
        let mut cells: Vec<ProfileVenueCell> = stmt
            .query_map(params![snapshot_id, methodology.key()], |row| {
                Ok(ProfileVenueCell {
                    methodology,
                    profile: from_label(0, row.get(0)?)?,
                    venue_id: row.get(1)?,
                    customers: row.get::<_, i64>(2)? as usize,
                    value: row.get(3)?,
                    mean_ticket: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Stable sort keeps venue order inside each profile.
        cells.sort_by_key(|c| std::cmp::Reverse(c.profile.rank()));
        Ok(cells)
    }

    /// Raw JSON of a supplementary report.
    pub fn report_document(&self, snapshot_id: &str, name: &str) -> SegResult<Option<String>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM report_document WHERE snapshot_id = ?1 AND name = ?2",
                params![snapshot_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    pub fn events(&self, snapshot_id: &str) -> SegResult<Vec<RunEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM event_log WHERE snapshot_id = ?1 ORDER BY seq ASC",
        )?;
        let payloads = stmt
            .query_map(params![snapshot_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| Ok(serde_json::from_str(p)?))
            .collect()
    }
}
