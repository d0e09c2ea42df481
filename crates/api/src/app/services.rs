//! Runtime wiring: connection pool, dialect-bound store, request deadlines.

use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool};
use tracing::info;

use ledger_core::StorageError;
use ledger_storage::{CancelSignal, Store, map_sqlx_error, schema};

use crate::config::Settings;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pool: AnyPool,
    store: Store,
    query_timeout: Option<Duration>,
}

impl AppServices {
    /// Open the pool, resolve the dialect from the live backend and make sure
    /// the schema exists.
    pub async fn connect(settings: &Settings) -> Result<Self, StorageError> {
        sqlx::any::install_default_drivers();

        let options = if settings.is_in_memory() {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(settings.max_connections)
        };

        let pool = options
            .connect(&settings.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Store::for_connection(&conn)?;
        schema::migrate(&mut conn, store.dialect()).await?;
        drop(conn);

        info!(dialect = %store.dialect(), "ledger database ready");

        Ok(Self {
            pool,
            store,
            query_timeout: settings.query_timeout,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One pooled connection for the lifetime of a request.
    pub async fn acquire(&self) -> Result<PoolConnection<Any>, StorageError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }

    /// Cancellation signal for a request starting now.
    pub fn signal(&self) -> CancelSignal {
        match self.query_timeout {
            Some(timeout) => CancelSignal::none().with_timeout(timeout),
            None => CancelSignal::none(),
        }
    }
}
