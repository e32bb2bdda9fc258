use std::fmt;
use std::sync::Arc;

use sqlx::{Any, AnyPool, Transaction as SqlxTransaction};
use tracing::{debug, error as log_error, info, warn};

use crate::database::context::{ContextSettings, DataContext, Target};
use crate::database::error::DbResult;
use crate::database::translator::Dialect;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Explicit unit of work
///
/// Holds at most one open transaction. While one is open every
/// [`DataContext`] call runs on it; otherwise calls run on the pool.
/// `begin` on an open handle, and `commit`/`rollback` on a closed one, are
/// no-ops. Dropping a handle with an open transaction rolls it back.
pub struct DbTransaction {
    pool: AnyPool,
    settings: Arc<ContextSettings>,
    transaction: Option<SqlxTransaction<'static, Any>>,
}

impl DbTransaction {
    pub(crate) fn new(pool: AnyPool, settings: Arc<ContextSettings>) -> Self {
        Self {
            pool,
            settings,
            transaction: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.transaction.is_some()
    }

    /// Begin a new transaction unless one is already open
    pub async fn begin(&mut self, isolation: Option<IsolationLevel>) -> DbResult<()> {
        if self.transaction.is_some() {
            debug!("Transaction already open; begin ignored");
            return Ok(());
        }

        debug!("Beginning database transaction");
        let mut transaction = self.pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            self.settings.messages.wrap(e)
        })?;

        if let Some(level) = isolation {
            match self.settings.statements.dialect() {
                Dialect::Postgres => {
                    let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
                    sqlx::query(&sql)
                        .execute(&mut *transaction)
                        .await
                        .map_err(|e| {
                            log_error!("Failed to set isolation level {}: {}", level, e);
                            self.settings.messages.wrap(e)
                        })?;
                }
                Dialect::Sqlite => {
                    debug!("SQLite transactions are serializable; {} ignored", level);
                }
            }
        }

        self.transaction = Some(transaction);
        Ok(())
    }

    /// Commit the transaction
    pub async fn commit(&mut self) -> DbResult<()> {
        let Some(transaction) = self.transaction.take() else {
            debug!("No active transaction; commit ignored");
            return Ok(());
        };

        debug!("Committing transaction");
        transaction.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            self.settings.messages.wrap(e).with_context("commit")
        })?;

        info!("Transaction committed");
        Ok(())
    }

    /// Rollback the transaction
    pub async fn rollback(&mut self) -> DbResult<()> {
        let Some(transaction) = self.transaction.take() else {
            debug!("No active transaction; rollback ignored");
            return Ok(());
        };

        debug!("Rolling back transaction");
        transaction.rollback().await.map_err(|e| {
            log_error!("Failed to rollback transaction: {}", e);
            self.settings.messages.wrap(e).with_context("rollback")
        })?;

        Ok(())
    }

    /// Release an open transaction; safe to call more than once
    pub async fn dispose(&mut self) -> DbResult<()> {
        if self.transaction.is_some() {
            warn!("Disposing an open transaction; rolling back");
        }
        self.rollback().await
    }
}

impl DataContext for DbTransaction {
    fn settings(&self) -> &Arc<ContextSettings> {
        &self.settings
    }

    fn target(&mut self) -> Target<'_> {
        match self.transaction.as_mut() {
            Some(transaction) => Target::Connection(&mut **transaction),
            None => Target::Pool(&self.pool),
        }
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            warn!("Transaction dropped while open; it will be rolled back");
        }
    }
}
