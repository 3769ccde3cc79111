use chrono::{DateTime, Utc};
use log::info;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::IngestError;
use crate::exchange_rate::{DailyRateSnapshot, IngestResult, StagingRow};
use crate::open_exchange::RateSource;
use crate::warehouse::Warehouse;

/// Fetches daily rates and loads them through staging into production.
pub struct IngestPipeline<S, W> {
    source: S,
    warehouse: W,
    // Staging is shared between runs, so only one run may hold it at a time.
    run_lock: Mutex<()>,
}

impl<S: RateSource, W: Warehouse> IngestPipeline<S, W> {
    pub fn new(source: S, warehouse: W) -> Self {
        Self {
            source,
            warehouse,
            run_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[cfg(test)]
    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Loads the last `number_of_days` days (today included).
    ///
    /// Rows are staged, merged and the staging table truncated, in that order.
    /// Nothing is written when no day produced rows. A failing step stops the run;
    /// staged rows are then left for the next successful run to clear.
    pub async fn ingest_historical_rates(
        &self,
        number_of_days: u32,
    ) -> Result<IngestResult, IngestError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| IngestError::AlreadyRunning)?;
        let run_id = Uuid::new_v4();

        let snapshots = self.source.fetch_historical_rates(number_of_days).await?;
        info!(
            "[{}] fetched {} of {} requested days",
            run_id,
            snapshots.len(),
            number_of_days
        );

        let rows = build_staging_rows(&snapshots, self.source.base_currency(), Utc::now());

        let mut inserted_rows = 0;
        let mut staging_merged = false;
        let mut staging_truncated = false;
        if rows.is_empty() {
            info!("[{}] no rows to load, warehouse untouched", run_id);
        } else {
            inserted_rows = self.warehouse.insert_into_staging(&rows).await?;
            info!("[{}] staged {} rows", run_id, inserted_rows);

            self.warehouse.merge_staging_into_prod().await?;
            staging_merged = true;

            self.warehouse.truncate_staging().await?;
            staging_truncated = true;
            info!("[{}] merged and truncated staging", run_id);
        }

        Ok(IngestResult {
            run_id,
            inserted_rows,
            days_requested: number_of_days,
            staging_merged,
            staging_truncated,
            ingested_at: Utc::now(),
        })
    }
}

/// One row per (day, currency), skipping the base currency, all stamped `ingested_at`.
pub fn build_staging_rows(
    snapshots: &[DailyRateSnapshot],
    base_currency: &str,
    ingested_at: DateTime<Utc>,
) -> Vec<StagingRow> {
    snapshots
        .iter()
        .flat_map(|snapshot| {
            snapshot
                .rates
                .iter()
                .filter(|(currency, _)| currency.as_str() != base_currency)
                .map(move |(currency, rate)| StagingRow {
                    rate_date: snapshot.day,
                    currency: currency.clone(),
                    rate: *rate,
                    ingested_at: Some(ingested_at),
                })
        })
        .collect()
}
