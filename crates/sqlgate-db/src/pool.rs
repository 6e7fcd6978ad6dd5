//! Provider construction from configuration.

use crate::error::DbError;
use crate::postgres::PgProvider;
use crate::session::ConnectionProvider;
use crate::sqlite::SqliteProvider;
use sqlgate_core::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;

/// Open the pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn ConnectionProvider>, DbError> {
    let url = config.connection_url()?;
    let backend = config.backend()?;

    tracing::info!(
        database = %config.name,
        backend = %backend,
        max_connections = config.max_connections,
        "Connecting database pool"
    );

    let provider: Arc<dyn ConnectionProvider> = match backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteProvider::connect(&url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PgProvider::connect(&url, config.max_connections).await?)
        }
    };
    Ok(provider)
}
