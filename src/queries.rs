//! SQL templates run against the warehouse.
//!
//! Names are spliced in verbatim and must already be validated identifiers.

pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", schema, table)
}

/// Upsert staging into production keyed on `(rate_date, currency)`.
///
/// Unchanged rates are left alone so `last_updated_at` only moves on real changes.
/// Staging may still hold rows from a run whose merge failed, so only the most
/// recently ingested row per pair is merged.
pub fn merge_exchange_rates(schema: &str, staging_table: &str, prod_table: &str) -> String {
    format!(
        r#"MERGE INTO {prod} AS t
USING (
    SELECT DISTINCT ON (rate_date, currency) rate_date, currency, rate
    FROM {staging}
    ORDER BY rate_date, currency, ingested_at DESC NULLS LAST
) AS s
ON t.rate_date = s.rate_date AND t.currency = s.currency
WHEN MATCHED AND t.rate IS DISTINCT FROM s.rate THEN
    UPDATE SET rate = s.rate, last_updated_at = now()
WHEN NOT MATCHED THEN
    INSERT (rate_date, currency, rate, last_updated_at)
    VALUES (s.rate_date, s.currency, s.rate, now())"#,
        prod = qualified_name(schema, prod_table),
        staging = qualified_name(schema, staging_table),
    )
}

pub fn truncate_table(schema: &str, table: &str) -> String {
    format!("TRUNCATE TABLE {}", qualified_name(schema, table))
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema)
}

pub fn create_staging_table(schema: &str, table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    rate_date DATE NOT NULL,
    currency TEXT NOT NULL,
    rate NUMERIC NOT NULL,
    ingested_at TIMESTAMPTZ
)"#,
        qualified_name(schema, table)
    )
}

pub fn create_prod_table(schema: &str, table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    rate_date DATE NOT NULL,
    currency TEXT NOT NULL,
    rate NUMERIC NOT NULL,
    last_updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (rate_date, currency)
)"#,
        qualified_name(schema, table)
    )
}

pub fn insert_staging_rows(schema: &str, table: &str) -> String {
    format!(
        "INSERT INTO {} (rate_date, currency, rate, ingested_at) ",
        qualified_name(schema, table)
    )
}
