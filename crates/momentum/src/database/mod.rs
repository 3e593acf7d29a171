use std::num::NonZero;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use url::Url;

mod error;
pub use error::{Error, Result};

/// A handle to the website's database.
#[derive(Debug, AsRef, Clone)]
pub struct Database {
    connections: PgPool,
}

#[derive(Debug)]
pub struct DatabaseConnectionOptions<'a> {
    pub url: &'a Url,
    pub min_connections: u32,
    pub max_connections: Option<NonZero<u32>>,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Display, Error, From)]
#[display("failed to establish database connection: {_0}")]
pub struct EstablishDatabaseConnectionError(sqlx::Error);

impl Database {
    #[tracing::instrument(level = "debug", skip_all, fields(host = url.host_str()), err)]
    pub async fn connect(
        DatabaseConnectionOptions { url, min_connections, max_connections, acquire_timeout }: DatabaseConnectionOptions<'_>,
    ) -> Result<Self, EstablishDatabaseConnectionError> {
        let max_connections = max_connections.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .ok()
                .and_then(|amount| u32::try_from(amount.get()).ok())
                .and_then(NonZero::new)
                .unwrap_or(NonZero::<u32>::MIN)
        });

        PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections.get())
            .acquire_timeout(acquire_timeout)
            .connect(url.as_str())
            .await
            .map(|pool| Self { connections: pool })
            .map_err(EstablishDatabaseConnectionError)
    }

    /// Closes the connection pool.
    ///
    /// Any queries made after this call completes will fail.
    #[tracing::instrument(level = "trace")]
    pub async fn cleanup(&self) {
        self.connections.close().await;
    }
}
