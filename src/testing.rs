//! In-memory stand-ins for the provider and warehouse.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Notify;

use crate::error::{LoadError, ProviderError};
use crate::exchange_rate::{DailyRateSnapshot, StagingRow};
use crate::open_exchange::RateSource;
use crate::warehouse::Warehouse;

pub fn snapshot(day: &str, rates: &[(&str, &str)]) -> DailyRateSnapshot {
    DailyRateSnapshot {
        day: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
        rates: rates
            .iter()
            .map(|(c, r)| (c.to_string(), r.parse::<Decimal>().unwrap()))
            .collect(),
    }
}

pub struct StaticRates {
    snapshots: Vec<DailyRateSnapshot>,
    pub requested: Mutex<Vec<u32>>,
    gate: Option<Arc<Notify>>,
}

impl StaticRates {
    pub fn new(snapshots: Vec<DailyRateSnapshot>) -> Self {
        Self {
            snapshots,
            requested: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Holds every fetch until `gate` is notified.
    pub fn gated(snapshots: Vec<DailyRateSnapshot>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(snapshots)
        }
    }
}

#[async_trait]
impl RateSource for StaticRates {
    fn base_currency(&self) -> &str {
        "EUR"
    }

    async fn fetch_historical_rates(
        &self,
        days: u32,
    ) -> Result<Vec<DailyRateSnapshot>, ProviderError> {
        self.requested.lock().unwrap().push(days);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self
            .snapshots
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect())
    }
}

/// Records every call; optionally rejects inserts or merges.
#[derive(Default)]
pub struct RecordingWarehouse {
    pub calls: Mutex<Vec<&'static str>>,
    pub staged: Mutex<Vec<StagingRow>>,
    pub reject_insert: bool,
    pub fail_merge: bool,
}

impl RecordingWarehouse {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn insert_into_staging(&self, rows: &[StagingRow]) -> Result<u64, LoadError> {
        self.calls.lock().unwrap().push("insert");
        if self.reject_insert {
            return Err(LoadError::Rejected {
                table: "stg_exchange_rates".to_string(),
                detail: "row 0: invalid value".to_string(),
            });
        }
        self.staged.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn merge_staging_into_prod(&self) -> Result<(), LoadError> {
        self.calls.lock().unwrap().push("merge");
        if self.fail_merge {
            return Err(LoadError::Statement {
                statement: "merge",
                source: sqlx::Error::PoolTimedOut,
            });
        }
        Ok(())
    }

    async fn truncate_staging(&self) -> Result<(), LoadError> {
        self.calls.lock().unwrap().push("truncate");
        Ok(())
    }
}
