//! MySQL health checks.

use crate::client::MySqlStore;
use tracing::{debug, error};

/// Check MySQL connection health.
pub async fn check_connection(store: &MySqlStore) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(store.pool())
        .await
    {
        Ok(_) => {
            debug!("MySQL connection healthy");
            true
        }
        Err(e) => {
            error!("MySQL health check failed: {}", e);
            false
        }
    }
}
