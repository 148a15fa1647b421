//! MySQL client wrapper implementing the storage seam.

use std::time::Duration;

use async_trait::async_trait;
use purge_core::{
    Error, PrefixResolver, Query, Result, Row, Statement, Storage, StorageErrorCode, Value,
};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::config::MySqlConfig;
use crate::decode::decode_row;

/// Pooled MySQL connection used by the purge pipeline.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    config: MySqlConfig,
}

impl MySqlStore {
    /// Connects a new pool.
    ///
    /// Connections are recycled after `max_lifetime_secs`, which keeps long
    /// drains clear of server-side `wait_timeout` disconnects.
    pub async fn connect(config: MySqlConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(config.timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                Error::storage(
                    StorageErrorCode::FetchFailed,
                    format!("Failed to connect: {}", e),
                )
            })?;

        info!(
            table_prefix = %config.table_prefix,
            max_connections = config.max_connections,
            "Created MySQL pool"
        );

        Ok(Self { pool, config })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: MySqlPool, config: MySqlConfig) -> Self {
        Self { pool, config }
    }

    /// Returns the inner pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    /// Table resolver for the configured prefix.
    pub fn resolver(&self) -> PrefixResolver {
        PrefixResolver::new(self.config.table_prefix.clone())
    }
}

fn fetch_error(e: sqlx::Error) -> Error {
    Error::storage(StorageErrorCode::FetchFailed, format!("Query error: {}", e))
}

#[async_trait]
impl Storage for MySqlStore {
    async fn fetch_all(&self, query: &Query) -> Result<Vec<Row>> {
        let sql = query.to_sql();
        debug!(sql = %sql, "fetch_all");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(fetch_error)?;

        rows.iter()
            .map(|row| decode_row(row).map_err(fetch_error))
            .collect()
    }

    async fn fetch_one(&self, query: &Query) -> Result<Option<Value>> {
        let sql = query.to_sql();
        debug!(sql = %sql, "fetch_one");

        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(fetch_error)?;

        match row {
            Some(row) => {
                let decoded = decode_row(&row).map_err(fetch_error)?;
                Ok(decoded.into_first())
            }
            None => Ok(None),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let sql = statement.to_sql();
        debug!(sql = %sql, "execute");

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::storage(
                    StorageErrorCode::ExecuteFailed,
                    format!("Statement error: {}", e),
                )
            })?;

        Ok(result.rows_affected())
    }

    async fn reconnect(&self) -> Result<()> {
        // The pool retires connections past max_lifetime on its own.
        debug!(
            max_lifetime_secs = self.config.max_lifetime_secs,
            "Connection refresh delegated to pool"
        );
        Ok(())
    }
}
