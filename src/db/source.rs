//! Named database sources.
//!
//! A source is a configured connection pool with an identifier that tool
//! definitions refer to. The registry is built once at startup and read-only
//! afterwards, so it is shared across invocations without locking.

use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgPoolOptions, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::SourceConfig;
use crate::error::ConfigError;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    MySql,
    Postgres,
    SQLite,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::SQLite => "sqlite",
        }
    }

    /// Whether the driver can bind array values natively.
    pub fn supports_array_binds(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySql,
            DbPool::Postgres(_) => DatabaseType::Postgres,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// One configured source: an id and its live pool.
#[derive(Debug, Clone)]
pub struct Source {
    id: String,
    pool: DbPool,
}

impl Source {
    /// Wrap an already-connected pool, mainly for tests.
    pub fn from_pool(id: impl Into<String>, pool: DbPool) -> Self {
        Self {
            id: id.into(),
            pool,
        }
    }

    /// Connect a source from its configuration.
    pub async fn connect(config: &SourceConfig) -> Result<Self, ConfigError> {
        let connect_err = |e: sqlx::Error| ConfigError::SourceConnect {
            id: config.id.clone(),
            message: e.to_string(),
        };

        let pool = match config.db_type {
            DatabaseType::MySql => {
                let options = MySqlConnectOptions::from_str(&config.url)
                    .map_err(connect_err)?
                    .charset("utf8mb4");
                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                DbPool::MySql(pool)
            }
            DatabaseType::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(&config.url)
                    .await
                    .map_err(connect_err)?;
                DbPool::Postgres(pool)
            }
            DatabaseType::SQLite => {
                let options =
                    SqliteConnectOptions::from_str(&config.url).map_err(connect_err)?;
                let pool = SqlitePoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                DbPool::SQLite(pool)
            }
        };

        info!(
            source = %config.id,
            db_type = %config.db_type,
            "Connected source"
        );

        Ok(Self {
            id: config.id.clone(),
            pool,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.db_type()
    }
}

/// All configured sources by name. Frozen after startup.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every configured source, failing startup on the first error.
    pub async fn connect_all(configs: &[SourceConfig]) -> Result<Self, ConfigError> {
        let mut sources = HashMap::with_capacity(configs.len());
        for config in configs {
            let source = Source::connect(config).await?;
            sources.insert(config.id.clone(), Arc::new(source));
        }
        Ok(Self { sources })
    }

    /// Register an already-built source, mainly for tests.
    pub fn insert(&mut self, source: Source) {
        self.sources.insert(source.id().to_string(), Arc::new(source));
    }

    /// Look up a source by name.
    pub fn get(&self, name: &str) -> Result<Arc<Source>, ConfigError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::unknown_source(name))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Close every pool. Called on shutdown.
    pub async fn close_all(&self) {
        for (id, source) in &self.sources {
            info!(source = %id, "Closing source");
            source.pool().close().await;
        }
    }
}
