//! Data access over `sqlx::Any`: pool setup, the data context and its
//! supporting pieces.

pub mod context;
pub mod entity;
pub mod error;
pub mod factory;
pub mod filter;
pub mod messages;
pub mod repository;
pub mod statement;
pub mod transaction;
pub mod translator;

use std::str::FromStr;
use std::time::Duration;

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::{error as log_error, info, warn};

use self::error::DatabaseError;
use self::translator::Dialect;

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    /// Defer opening connections until first use
    pub lazy: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            lazy: false,
        }
    }
}

/// Initialize the database connection pool
pub async fn init_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<AnyPool, DatabaseError> {
    let config = config.unwrap_or_default();
    // Reject unsupported schemes before the driver registry sees them
    Dialect::from_url(database_url)?;

    if config.max_connections == 0 {
        return Err(DatabaseError::config("max_connections must be greater than 0"));
    }
    if config.min_connections > config.max_connections {
        return Err(DatabaseError::config(format!(
            "min_connections ({}) exceeds max_connections ({})",
            config.min_connections, config.max_connections
        )));
    }

    sqlx::any::install_default_drivers();

    info!(
        "Initializing database pool: max_connections={}, min_connections={}, connection_timeout={:?}",
        config.max_connections, config.min_connections, config.connection_timeout
    );

    let options = AnyConnectOptions::from_str(database_url).map_err(|e| {
        log_error!("Invalid database URL: {}", e);
        DatabaseError::from_sqlx(e)
    })?;

    let pool_options = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime);

    if config.lazy {
        info!("Database pool created lazily; connections open on first use");
        return Ok(pool_options.connect_lazy_with(options));
    }

    let pool = pool_options.connect_with(options).await.map_err(|e| {
        log_error!("Failed to initialize database pool: {}", e);
        DatabaseError::from_sqlx(e)
    })?;

    // Test the connection
    pool.acquire().await.map_err(|e| {
        log_error!("Failed to acquire test connection: {}", e);
        DatabaseError::from_sqlx(e)
    })?;

    info!("Database pool initialized successfully");
    Ok(pool)
}

/// Connection pool health check
pub async fn health_check(pool: &AnyPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| {
            warn!("Health check failed: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

    Ok(())
}

/// Get pool statistics
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub num_idle: u32,
    pub size: u32,
}

pub fn get_pool_stats(pool: &AnyPool) -> PoolStats {
    PoolStats {
        num_idle: pool.num_idle() as u32,
        size: pool.size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert!(!config.lazy);
    }

    #[tokio::test]
    async fn test_init_pool_rejects_unknown_scheme() {
        let err = init_pool("mysql://localhost/db", None).await.unwrap_err();
        assert!(matches!(
            err.kind,
            error::DatabaseErrorKind::ConfigError { .. }
        ));
    }

    #[tokio::test]
    async fn test_init_pool_rejects_inverted_bounds() {
        let config = PoolConfig {
            max_connections: 1,
            min_connections: 2,
            ..Default::default()
        };
        let err = init_pool("sqlite::memory:", Some(config)).await.unwrap_err();
        assert!(err.to_string().contains("min_connections"));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_health_check_on_memory_database() {
        let config = PoolConfig {
            max_connections: 1,
            min_connections: 1,
            idle_timeout: None,
            max_lifetime: None,
            ..Default::default()
        };
        let pool = init_pool("sqlite::memory:", Some(config)).await.unwrap();
        assert!(health_check(&pool).await.is_ok());
        let stats = get_pool_stats(&pool);
        assert_eq!(stats.size, 1);
        pool.close().await;
    }
}
