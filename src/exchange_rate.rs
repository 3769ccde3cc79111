use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Rates observed for one calendar day, relative to the base currency.
///
/// An empty `rates` map marks a day that could not be fetched or normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRateSnapshot {
    pub day: NaiveDate,
    pub rates: BTreeMap<String, Decimal>,
}

impl DailyRateSnapshot {
    pub fn failed(day: NaiveDate) -> Self {
        Self {
            day,
            rates: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// One (date, currency) observation bound for the staging table.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRow {
    pub rate_date: NaiveDate,
    pub currency: String,
    pub rate: Decimal,
    pub ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub run_id: Uuid,
    pub inserted_rows: u64,
    pub days_requested: u32,
    pub staging_merged: bool,
    pub staging_truncated: bool,
    pub ingested_at: DateTime<Utc>,
}
