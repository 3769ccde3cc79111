use std::str::FromStr;

use actix_web::http::StatusCode;

use crate::api::MAX_INGEST_DAYS;
use crate::error::ConfigError;

/// Rate provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Currencies requested from the provider; empty requests every currency.
    /// A non-empty list always includes the base currency.
    pub symbols: Vec<String>,
    pub base_currency: String,
    pub max_concurrent_requests: usize,
}

/// Warehouse location. `database_url` doubles as the credential reference.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub database_url: String,
    pub schema: String,
    pub staging_table: String,
    pub prod_table: String,
    pub create_tables: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub default_ingest_days: u32,
    pub failure_status: StatusCode,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub warehouse: WarehouseConfig,
    pub server: ServerConfig,
}

impl Settings {
    /// Reads settings from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let base_currency = currency_code("BASE_CURRENCY", &or_default("BASE_CURRENCY", "EUR"))?;
        let mut symbols = Vec::new();
        for raw in or_default("OPEN_EXCHANGE_SYMBOLS", "").split(',') {
            if raw.trim().is_empty() {
                continue;
            }
            let code = currency_code("OPEN_EXCHANGE_SYMBOLS", raw)?;
            if !symbols.contains(&code) {
                symbols.push(code);
            }
        }
        if !symbols.is_empty() && !symbols.contains(&base_currency) {
            symbols.push(base_currency.clone());
        }

        let max_concurrent_requests: usize = parse(
            "MAX_CONCURRENT_REQUESTS",
            &or_default("MAX_CONCURRENT_REQUESTS", "8"),
        )?;
        if max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_CONCURRENT_REQUESTS",
                value: "0".to_string(),
            });
        }

        let provider = ProviderConfig {
            base_url: required("OPEN_EXCHANGE_URL")?.trim_end_matches('/').to_string(),
            api_key: required("OPEN_EXCHANGE_API_KEY")?,
            symbols,
            base_currency,
            max_concurrent_requests,
        };

        let warehouse = WarehouseConfig {
            database_url: required("DATABASE_URL")?,
            schema: identifier("WAREHOUSE_SCHEMA", or_default("WAREHOUSE_SCHEMA", "public"))?,
            staging_table: identifier(
                "STAGING_TABLE",
                or_default("STAGING_TABLE", "stg_exchange_rates"),
            )?,
            prod_table: identifier("PROD_TABLE", or_default("PROD_TABLE", "exchange_rates"))?,
            create_tables: parse(
                "WAREHOUSE_CREATE_TABLES",
                &or_default("WAREHOUSE_CREATE_TABLES", "false"),
            )?,
        };

        let status: u16 = parse("INGEST_ERROR_STATUS", &or_default("INGEST_ERROR_STATUS", "500"))?;
        let failure_status = StatusCode::from_u16(status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .ok_or(ConfigError::Invalid {
                name: "INGEST_ERROR_STATUS",
                value: status.to_string(),
            })?;

        let default_ingest_days: u32 = parse(
            "DEFAULT_INGEST_DAYS",
            &or_default("DEFAULT_INGEST_DAYS", "7"),
        )?;
        if default_ingest_days > MAX_INGEST_DAYS {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_INGEST_DAYS",
                value: default_ingest_days.to_string(),
            });
        }

        let server = ServerConfig {
            bind_addr: or_default("BIND_ADDR", "127.0.0.1:8080"),
            default_ingest_days,
            failure_status,
        };

        Ok(Self {
            provider,
            warehouse,
            server,
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn currency_code(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let code = value.trim().to_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(code)
}

/// Accepts plain SQL identifiers only, since table names are spliced into statements.
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn identifier(name: &'static str, value: String) -> Result<String, ConfigError> {
    if is_identifier(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid { name, value })
    }
}
