use super::{from_label, label_of, SegStore, TIMESTAMP_FORMAT};
use crate::{
    engine::CustomerClassification,
    error::SegResult,
    rfv::RfvScore,
    types::Scope,
};
use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

fn timestamp(idx: usize, text: String) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn classification_from_row(row: &Row<'_>) -> rusqlite::Result<CustomerClassification> {
    Ok(CustomerClassification {
        customer_id:       row.get(0)?,
        dominant_venue:    row.get(1)?,
        gender:            from_label(2, row.get(2)?)?,
        age:               row.get::<_, Option<i64>>(3)?.map(|a| a as u32),
        age_band:          from_label(4, row.get(4)?)?,
        total_value:       row.get(5)?,
        period_value:      row.get(6)?,
        transaction_count: row.get::<_, i64>(7)? as usize,
        first_purchase_at: timestamp(8, row.get(8)?)?,
        last_purchase_at:  timestamp(9, row.get(9)?)?,
        dominant_category: row.get(10)?,
        dominant_store:    row.get(11)?,
        venue_value:       row.get(12)?,
        high_spender:      row.get::<_, i64>(13)? != 0,
        historic_profile:  from_label(14, row.get(14)?)?,
        period_profile:    from_label(15, row.get(15)?)?,
        recency_score:     row.get::<_, i64>(16)? as u8,
        frequency_score:   row.get::<_, i64>(17)? as u8,
        value_score:       row.get::<_, i64>(18)? as u8,
        total_score:       row.get::<_, i64>(19)? as u8,
        rfv_profile:       from_label(20, row.get(20)?)?,
        venue_total_score: row.get::<_, i64>(21)? as u8,
        venue_rfv_profile: from_label(22, row.get(22)?)?,
        persona:           from_label(23, row.get(23)?)?,
    })
}

const CLASSIFICATION_COLUMNS: &str = "customer_id, dominant_venue, gender, age, age_band,
    total_value, period_value, transaction_count, first_purchase_at, last_purchase_at,
    dominant_category, dominant_store, venue_value, high_spender, historic_profile,
    period_profile, recency_score, frequency_score, value_score, total_score, rfv_profile,
    venue_total_score, venue_rfv_profile, persona";

impl SegStore {
    // ── Customer classification ────────────────────────────────

    pub(super) fn insert_classification(
        &self,
        snapshot_id: &str,
        c: &CustomerClassification,
    ) -> SegResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO customer_classification (snapshot_id, {CLASSIFICATION_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)"
            ),
            params![
                snapshot_id,
                c.customer_id,
                c.dominant_venue,
                label_of(&c.gender)?,
                c.age.map(i64::from),
                label_of(&c.age_band)?,
                c.total_value,
                c.period_value,
                c.transaction_count as i64,
                c.first_purchase_at.format(TIMESTAMP_FORMAT).to_string(),
                c.last_purchase_at.format(TIMESTAMP_FORMAT).to_string(),
                c.dominant_category,
                c.dominant_store,
                c.venue_value,
                c.high_spender as i64,
                label_of(&c.historic_profile)?,
                label_of(&c.period_profile)?,
                c.recency_score as i64,
                c.frequency_score as i64,
                c.value_score as i64,
                c.total_score as i64,
                label_of(&c.rfv_profile)?,
                c.venue_total_score as i64,
                label_of(&c.venue_rfv_profile)?,
                label_of(&c.persona)?,
            ],
        )?;
        Ok(())
    }

    pub fn customer_row(
        &self,
        snapshot_id: &str,
        customer_id: &str,
    ) -> SegResult<Option<CustomerClassification>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CLASSIFICATION_COLUMNS} FROM customer_classification
                     WHERE snapshot_id = ?1 AND customer_id = ?2"
                ),
                params![snapshot_id, customer_id],
                classification_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All classification rows of a run, ordered by customer id.
    pub fn customer_rows(&self, snapshot_id: &str) -> SegResult<Vec<CustomerClassification>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLASSIFICATION_COLUMNS} FROM customer_classification
             WHERE snapshot_id = ?1 ORDER BY customer_id ASC"
        ))?;
        let rows = stmt
            .query_map(params![snapshot_id], classification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── RFV scores ─────────────────────────────────────────────

    pub(super) fn insert_rfv_score(&self, snapshot_id: &str, s: &RfvScore) -> SegResult<()> {
        self.conn.execute(
            "INSERT INTO rfv_score (
                snapshot_id, scope, venue_id, customer_id,
                recency_score, frequency_score, value_score, total_score, profile
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot_id,
                s.scope.key(),
                s.venue_id.as_deref().unwrap_or(""),
                s.customer_id,
                s.recency_score as i64,
                s.frequency_score as i64,
                s.value_score as i64,
                s.total_score as i64,
                label_of(&s.profile)?,
            ],
        )?;
        Ok(())
    }

    /// Scores of one scope, ordered by venue then customer.
    pub fn rfv_scores(&self, snapshot_id: &str, scope: Scope) -> SegResult<Vec<RfvScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, venue_id, recency_score, frequency_score, value_score,
                    total_score, profile
             FROM rfv_score WHERE snapshot_id = ?1 AND scope = ?2
             ORDER BY venue_id ASC, customer_id ASC",
        )?;
        let scores = stmt
            .query_map(params![snapshot_id, scope.key()], |row| {
                let venue_id: String = row.get(1)?;
                Ok(RfvScore {
                    customer_id: row.get(0)?,
                    scope,
                    venue_id: (!venue_id.is_empty()).then_some(venue_id),
                    recency_score: row.get::<_, i64>(2)? as u8,
                    frequency_score: row.get::<_, i64>(3)? as u8,
                    value_score: row.get::<_, i64>(4)? as u8,
                    total_score: row.get::<_, i64>(5)? as u8,
                    profile: from_label(6, row.get(6)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    }
}
