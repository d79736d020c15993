//! Record persistence
//!
//! Records are written one at a time in the order the pipeline hands them over.
//! A failed insert only loses that record.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::config::{DatabaseConfig, PoolConfig};
use crate::errors::SwapSyncError;
use crate::normalizer::SwapRecord;

/// Destination for normalized swaps
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Creates the table and its index when missing. Idempotent
    async fn ensure_schema(&self) -> Result<(), SwapSyncError>;

    /// Persists one record
    async fn insert(&self, record: &SwapRecord) -> Result<(), SwapSyncError>;
}

/// Writes swaps into a Postgres table
pub struct PostgresSink {
    client: Client,
    connection: JoinHandle<()>,
    create_sql: String,
    index_sql: String,
    insert_sql: String,
}

impl PostgresSink {
    /// Opens the connection and applies the configured schema as `search_path`
    pub async fn connect(
        database: &DatabaseConfig,
        pool: &PoolConfig,
    ) -> Result<Self, SwapSyncError> {
        let (table, token0, token1) = table_identifiers(database, pool)?;

        let (client, connection) = tokio_postgres::connect(&database.url, NoTls).await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {}", e);
            }
        });

        client
            .batch_execute("SET application_name = 'UniswapV3Extractor'")
            .await?;
        if let Some(schema) = &database.schema {
            let schema = identifier(schema)?;
            client
                .batch_execute(&format!("SET search_path TO {schema}"))
                .await?;
        }
        info!(table, schema = ?database.schema, "Connected to database");

        Ok(Self {
            client,
            connection,
            create_sql: create_table_sql(table, token0, token1),
            index_sql: format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_block_number ON {table} (block_number)"
            ),
            insert_sql: format!(
                "INSERT INTO {table}
                    (block_number, transaction_hash, timestamp, {token0}, {token1}, sqrt_price_x96, liquidity, tick)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ),
        })
    }

    /// Drops the client and waits for the connection task to wind down
    pub async fn shutdown(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            error!("Database connection task failed: {}", e);
        }
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    async fn ensure_schema(&self) -> Result<(), SwapSyncError> {
        self.client.batch_execute(&self.create_sql).await?;
        self.client.batch_execute(&self.index_sql).await?;
        Ok(())
    }

    async fn insert(&self, record: &SwapRecord) -> Result<(), SwapSyncError> {
        let block_number = i32::try_from(record.block_number).map_err(|_| {
            SwapSyncError::Write(format!(
                "block {} does not fit an INTEGER column",
                record.block_number
            ))
        })?;
        let transaction_hash = format!("{:#x}", record.transaction_hash);

        self.client
            .execute(
                &self.insert_sql,
                &[
                    &block_number,
                    &transaction_hash,
                    &record.timestamp,
                    &record.token0_amount,
                    &record.token1_amount,
                    &record.sqrt_price_x96,
                    &record.liquidity,
                    &record.tick,
                ],
            )
            .await
            .map_err(|e| {
                SwapSyncError::Write(format!("swap in tx {transaction_hash}: {e}"))
            })?;
        Ok(())
    }
}

fn create_table_sql(table: &str, token0: &str, token1: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            block_number INTEGER NOT NULL,
            transaction_hash TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            {token0} DECIMAL NOT NULL,
            {token1} DECIMAL NOT NULL,
            sqrt_price_x96 NUMERIC NOT NULL,
            liquidity DECIMAL NOT NULL,
            tick INTEGER NOT NULL
        )"
    )
}

// Table and token column names end up in SQL text, so they must be plain identifiers
fn table_identifiers<'a>(
    database: &'a DatabaseConfig,
    pool: &'a PoolConfig,
) -> Result<(&'a str, &'a str, &'a str), SwapSyncError> {
    let table = identifier(&database.table)?;
    let token0 = identifier(&pool.token0_symbol)?;
    let token1 = identifier(&pool.token1_symbol)?;
    if token0 == token1 {
        return Err(SwapSyncError::Config(format!(
            "token columns must differ, both are {token0}"
        )));
    }
    Ok((table, token0, token1))
}

fn identifier(name: &str) -> Result<&str, SwapSyncError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SwapSyncError::Config(format!(
            "{name:?} is not a valid sql identifier"
        )))
    }
}
