use chrono::NaiveDate;
use thiserror::Error;

/// Failure to load a single day from the rate provider.
///
/// Never leaves the provider client: the affected day is logged and dropped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider answered with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no usable {currency} rate in payload")]
    MissingBaseRate { currency: String },
}

/// Failure of a whole fetch batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("can't build a {days} day window ending {end}")]
    DateWindow { days: u32, end: NaiveDate },
}

/// Warehouse write or statement failure.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("warehouse rejected insert into {table}: {detail}")]
    Rejected { table: String, detail: String },
    #[error("{statement} statement failed: {source}")]
    Statement {
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Error surfaced by one ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("another ingestion run is in progress")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
