//! Transaction ledger and customer dimension ingestion.
//!
//! Parses CSV into raw string records, then validates each one into a typed
//! row. A malformed row is excluded and counted in the `IngestReport`; it
//! never aborts the load.
//!
//! Expected CSV columns:
//!   transactions: customer_id, venue_id, amount, timestamp, category, store_id
//!   customers:    customer_id, gender, birth_date

use crate::{
    error::{SegError, SegResult},
    types::{CustomerId, Gender, Money, SnapshotId, VenueId, UNSPECIFIED},
};
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub customer_id: CustomerId,
    pub venue_id: VenueId,
    pub amount: Money,
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub store_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: CustomerId,
    pub gender: Gender,
    pub birth_date: Option<NaiveDate>,
}

/// A transaction row exactly as read from CSV, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub venue_id: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub store_id: String,
    /// Set by the CSV loader when a field was not valid UTF-8.
    #[serde(skip)]
    pub invalid_encoding: bool,
}

/// A customer dimension row exactly as read from CSV.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCustomer {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(skip)]
    pub invalid_encoding: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingCustomerId,
    MissingVenueId,
    NonPositiveAmount,
    UnparseableAmount,
    UnparseableTimestamp,
    /// Some field was not valid UTF-8 (e.g. a Latin-1 export).
    InvalidEncoding,
    DuplicateCustomer,
    /// Customer row kept with unknown age; counted but not excluded.
    InvalidBirthDate,
}

impl RejectReason {
    /// Whether the row was dropped, as opposed to kept with a degraded field.
    pub fn excludes_row(&self) -> bool {
        !matches!(self, RejectReason::InvalidBirthDate)
    }
}

/// Error counter for one ingestion pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub transactions_read: usize,
    pub transactions_accepted: usize,
    pub customers_read: usize,
    pub customers_accepted: usize,
    pub rejections: BTreeMap<RejectReason, usize>,
}

impl IngestReport {
    pub fn reject(&mut self, reason: RejectReason) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    /// Rows excluded from the run (degraded-but-kept rows are not counted).
    pub fn excluded(&self) -> usize {
        self.rejections
            .iter()
            .filter(|(r, _)| r.excludes_row())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }
}

/// The immutable input to one engine run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: SnapshotId,
    pub transactions: Vec<Transaction>,
    pub customers: Vec<CustomerRecord>,
    pub report: IngestReport,
}

impl Snapshot {
    /// Validate raw rows into a snapshot. Never fails on bad rows.
    pub fn from_raw(
        snapshot_id: impl Into<SnapshotId>,
        raw_transactions: Vec<RawTransaction>,
        raw_customers: Vec<RawCustomer>,
    ) -> Self {
        let mut report = IngestReport::default();

        report.transactions_read = raw_transactions.len();
        let transactions: Vec<Transaction> = raw_transactions
            .into_iter()
            .filter_map(|raw| match validate_transaction(&raw) {
                Ok(txn) => Some(txn),
                Err(reason) => {
                    report.reject(reason);
                    None
                }
            })
            .collect();
        report.transactions_accepted = transactions.len();

        report.customers_read = raw_customers.len();
        let mut seen = BTreeSet::new();
        let mut customers = Vec::with_capacity(raw_customers.len());
        for raw in raw_customers {
            if raw.invalid_encoding {
                report.reject(RejectReason::InvalidEncoding);
                continue;
            }
            let customer_id = raw.customer_id.trim().to_string();
            if customer_id.is_empty() {
                report.reject(RejectReason::MissingCustomerId);
                continue;
            }
            if !seen.insert(customer_id.clone()) {
                report.reject(RejectReason::DuplicateCustomer);
                continue;
            }
            let birth_date = match raw.birth_date.trim() {
                "" => None,
                text => {
                    let parsed = parse_date(text);
                    if parsed.is_none() {
                        report.reject(RejectReason::InvalidBirthDate);
                    }
                    parsed
                }
            };
            customers.push(CustomerRecord {
                customer_id,
                gender: Gender::parse(&raw.gender),
                birth_date,
            });
        }
        report.customers_accepted = customers.len();

        if report.excluded() > 0 {
            log::warn!(
                "snapshot: excluded {} malformed record(s): {:?}",
                report.excluded(),
                report.rejections
            );
        }

        Self {
            snapshot_id: snapshot_id.into(),
            transactions,
            customers,
            report,
        }
    }

    /// Load both CSV tables and validate them into a snapshot.
    pub fn load_files(
        snapshot_id: impl Into<SnapshotId>,
        transactions_path: &str,
        customers_path: &str,
    ) -> SegResult<Self> {
        let raw_txns = load_transactions_file(transactions_path)?;
        let raw_customers = load_customers_file(customers_path)?;
        Ok(Self::from_raw(snapshot_id, raw_txns, raw_customers))
    }
}

fn validate_transaction(raw: &RawTransaction) -> Result<Transaction, RejectReason> {
    if raw.invalid_encoding {
        return Err(RejectReason::InvalidEncoding);
    }
    let customer_id = raw.customer_id.trim();
    if customer_id.is_empty() {
        return Err(RejectReason::MissingCustomerId);
    }
    let venue_id = raw.venue_id.trim();
    if venue_id.is_empty() {
        return Err(RejectReason::MissingVenueId);
    }
    let amount: f64 = raw
        .amount
        .trim()
        .parse()
        .map_err(|_| RejectReason::UnparseableAmount)?;
    if !amount.is_finite() {
        return Err(RejectReason::UnparseableAmount);
    }
    if amount <= 0.0 {
        return Err(RejectReason::NonPositiveAmount);
    }
    let timestamp = parse_timestamp(&raw.timestamp).ok_or(RejectReason::UnparseableTimestamp)?;

    Ok(Transaction {
        customer_id: customer_id.to_string(),
        venue_id: venue_id.to_string(),
        amount,
        timestamp,
        category: label_or_unspecified(&raw.category),
        store_id: label_or_unspecified(&raw.store_id),
    })
}

fn label_or_unspecified(raw: &str) -> String {
    match raw.trim() {
        "" => UNSPECIFIED.to_string(),
        text => text.to_string(),
    }
}

/// Accepts date-time with a space or `T` separator, or a bare date (midnight).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

// ── CSV loading ────────────────────────────────────────────────────

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Read CSV rows as bytes and decode each one on its own. A row that is not
/// valid UTF-8 comes back as `T::default()` with `mark` applied, so validation
/// can count it. Only structural and IO failures are errors.
fn read_rows<R, T>(reader: R, table: &str, mark: fn(&mut T)) -> SegResult<Vec<T>>
where
    R: Read,
    T: DeserializeOwned + Default,
{
    let mut rdr = csv_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| SegError::InvalidSnapshot {
            reason: format!("{table} CSV header error: {e}"),
        })?
        .clone();

    let mut rows = Vec::new();
    for (line_num, result) in rdr.byte_records().enumerate() {
        let record = result.map_err(|e| SegError::InvalidSnapshot {
            reason: format!("{table} CSV parse error at line {}: {e}", line_num + 2),
        })?;
        let row = match StringRecord::from_byte_record(record) {
            Ok(text) => text.deserialize(Some(&headers)).map_err(|e| SegError::InvalidSnapshot {
                reason: format!("{table} CSV parse error at line {}: {e}", line_num + 2),
            })?,
            Err(e) => {
                log::debug!("{table} CSV line {}: {e}", line_num + 2);
                let mut row = T::default();
                mark(&mut row);
                row
            }
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Read raw transaction rows. Field-level problems are left for validation.
pub fn load_transactions<R: Read>(reader: R) -> SegResult<Vec<RawTransaction>> {
    read_rows(reader, "transaction", |row: &mut RawTransaction| row.invalid_encoding = true)
}

pub fn load_customers<R: Read>(reader: R) -> SegResult<Vec<RawCustomer>> {
    read_rows(reader, "customer", |row: &mut RawCustomer| row.invalid_encoding = true)
}

pub fn load_transactions_file(path: &str) -> SegResult<Vec<RawTransaction>> {
    let file = std::fs::File::open(path).map_err(|e| SegError::InvalidSnapshot {
        reason: format!("failed to open '{path}': {e}"),
    })?;
    load_transactions(file)
}

pub fn load_customers_file(path: &str) -> SegResult<Vec<RawCustomer>> {
    let file = std::fs::File::open(path).map_err(|e| SegError::InvalidSnapshot {
        reason: format!("failed to open '{path}': {e}"),
    })?;
    load_customers(file)
}
