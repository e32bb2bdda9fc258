//! Connection factories
//!
//! A [`ConnectionFactory`] owns a connection string and produces the
//! connection source on demand. Custom factories can add driver-specific
//! setup (pragmas, search paths) before handing the pool to a context.

use async_trait::async_trait;
use sqlx::AnyPool;
use tracing::debug;

use crate::database::error::DbResult;
use crate::database::{init_pool, PoolConfig};

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// The connection string the pool is bound to
    fn connection_string(&self) -> &str;

    /// Create a new connection source
    async fn create_pool(&self) -> DbResult<AnyPool>;
}

/// Default factory backed by [`init_pool`]
#[derive(Debug, Clone)]
pub struct PooledConnectionFactory {
    url: String,
    config: PoolConfig,
}

impl PooledConnectionFactory {
    pub fn new(url: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }
}

#[async_trait]
impl ConnectionFactory for PooledConnectionFactory {
    fn connection_string(&self) -> &str {
        &self.url
    }

    async fn create_pool(&self) -> DbResult<AnyPool> {
        debug!("Creating connection pool (lazy={})", self.config.lazy);
        init_pool(&self.url, Some(self.config.clone())).await
    }
}
