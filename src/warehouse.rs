use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder};

use crate::config::WarehouseConfig;
use crate::error::LoadError;
use crate::exchange_rate::StagingRow;
use crate::queries;

/// Keeps a single statement well under the Postgres bind parameter limit.
const INSERT_CHUNK_ROWS: usize = 1000;

/// Staging/production table operations used by the ingest pipeline.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn insert_into_staging(&self, rows: &[StagingRow]) -> Result<u64, LoadError>;
    async fn merge_staging_into_prod(&self) -> Result<(), LoadError>;
    async fn truncate_staging(&self) -> Result<(), LoadError>;
}

pub struct WarehouseClient {
    pool: PgPool,
    schema: String,
    staging_table: String,
    prod_table: String,
}

impl WarehouseClient {
    /// Builds the client without opening a connection; the pool connects on first use.
    pub fn new(config: &WarehouseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_lazy(&config.database_url)?;
        Ok(Self::with_pool(pool, config))
    }

    pub fn with_pool(pool: PgPool, config: &WarehouseConfig) -> Self {
        Self {
            pool,
            schema: config.schema.clone(),
            staging_table: config.staging_table.clone(),
            prod_table: config.prod_table.clone(),
        }
    }

    /// Appends `rows` to `table` in one transaction; either every row lands or none does.
    pub async fn insert_rows(&self, table: &str, rows: &[StagingRow]) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let rejected = |e: sqlx::Error| LoadError::Rejected {
            table: queries::qualified_name(&self.schema, table),
            detail: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(rejected)?;
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(queries::insert_staging_rows(&self.schema, table));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.rate_date)
                    .push_bind(row.currency.clone())
                    .push_bind(row.rate)
                    .push_bind(row.ingested_at);
            });
            let result = builder.build().execute(&mut *tx).await.map_err(rejected)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(rejected)?;

        debug!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }

    /// Runs `sql` to completion and returns whatever rows it produced.
    pub async fn execute_query(&self, sql: &str) -> Result<Vec<PgRow>, sqlx::Error> {
        sqlx::query(sql).fetch_all(&self.pool).await
    }

    /// Creates the schema and both tables when they don't exist yet.
    pub async fn ensure_tables(&self) -> Result<(), LoadError> {
        let statements = [
            queries::create_schema(&self.schema),
            queries::create_staging_table(&self.schema, &self.staging_table),
            queries::create_prod_table(&self.schema, &self.prod_table),
        ];
        for sql in &statements {
            self.execute_query(sql)
                .await
                .map_err(|source| LoadError::Statement {
                    statement: "create table",
                    source,
                })?;
        }
        info!(
            "Warehouse tables ready: {}, {}",
            queries::qualified_name(&self.schema, &self.staging_table),
            queries::qualified_name(&self.schema, &self.prod_table)
        );
        Ok(())
    }
}

#[async_trait]
impl Warehouse for WarehouseClient {
    async fn insert_into_staging(&self, rows: &[StagingRow]) -> Result<u64, LoadError> {
        self.insert_rows(&self.staging_table, rows).await
    }

    async fn merge_staging_into_prod(&self) -> Result<(), LoadError> {
        let sql = queries::merge_exchange_rates(&self.schema, &self.staging_table, &self.prod_table);
        self.execute_query(&sql)
            .await
            .map_err(|source| LoadError::Statement {
                statement: "merge",
                source,
            })?;
        Ok(())
    }

    async fn truncate_staging(&self) -> Result<(), LoadError> {
        let sql = queries::truncate_table(&self.schema, &self.staging_table);
        self.execute_query(&sql)
            .await
            .map_err(|source| LoadError::Statement {
                statement: "truncate",
                source,
            })?;
        Ok(())
    }
}
