//! The data context
//!
//! [`DataContext`] carries every CRUD verb as a provided method; implementors
//! only say where statements run ([`Target`]) and which settings apply.
//! [`DbContext`] runs on the pool, [`DbTransaction`] on its open transaction.
//!
//! ```no_run
//! use sqlcontext::database::context::{ContextOptions, DataContext, DbContext};
//! use sqlcontext::database::factory::PooledConnectionFactory;
//! use sqlcontext::database::PoolConfig;
//!
//! # async fn run() -> Result<(), sqlcontext::database::error::DatabaseError> {
//! let factory = PooledConnectionFactory::new("sqlite::memory:", PoolConfig::default());
//! let mut ctx = DbContext::connect(&factory, ContextOptions::default()).await?;
//! let touched = ctx.execute_sql("CREATE TABLE notes (id TEXT PRIMARY KEY)", vec![]).await?;
//! # let _ = touched;
//! ctx.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::{AnyConnection, AnyPool, FromRow, Row};
use tracing::{debug, error as log_error, info};

use crate::config::Config;
use crate::database::entity::{Entity, TableMap, Value};
use crate::database::error::DbResult;
use crate::database::factory::{ConnectionFactory, PooledConnectionFactory};
use crate::database::filter::Filter;
use crate::database::messages::ErrorMessages;
use crate::database::statement::{Pagination, StatementBuilder};
use crate::database::transaction::{DbTransaction, IsolationLevel};
use crate::database::translator::{bind_all, Dialect, QueryDescriptor, TranslateError};

/// Where a statement runs
pub enum Target<'a> {
    Pool(&'a AnyPool),
    Connection(&'a mut AnyConnection),
}

impl<'a> Target<'a> {
    pub async fn execute(
        self,
        sql: &'a str,
        args: AnyArguments<'a>,
    ) -> Result<AnyQueryResult, sqlx::Error> {
        let query = sqlx::query_with(sql, args);
        match self {
            Target::Pool(pool) => query.execute(pool).await,
            Target::Connection(conn) => query.execute(conn).await,
        }
    }

    pub async fn fetch_all<T>(self, sql: &'a str, args: AnyArguments<'a>) -> Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let query = sqlx::query_as_with::<_, T, _>(sql, args);
        match self {
            Target::Pool(pool) => query.fetch_all(pool).await,
            Target::Connection(conn) => query.fetch_all(conn).await,
        }
    }

    pub async fn fetch_optional<T>(
        self,
        sql: &'a str,
        args: AnyArguments<'a>,
    ) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let query = sqlx::query_as_with::<_, T, _>(sql, args);
        match self {
            Target::Pool(pool) => query.fetch_optional(pool).await,
            Target::Connection(conn) => query.fetch_optional(conn).await,
        }
    }

    pub async fn fetch_count(self, sql: &'a str, args: AnyArguments<'a>) -> Result<i64, sqlx::Error> {
        let query = sqlx::query_with(sql, args);
        let row = match self {
            Target::Pool(pool) => query.fetch_one(pool).await?,
            Target::Connection(conn) => query.fetch_one(conn).await?,
        };
        row.try_get::<i64, _>(0)
    }

    /// Lazily stream mapped rows
    pub fn fetch<T>(self, sql: &'a str, args: AnyArguments<'a>) -> BoxStream<'a, Result<T, sqlx::Error>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin + 'a,
    {
        let query = sqlx::query_as_with::<_, T, _>(sql, args);
        match self {
            Target::Pool(pool) => query.fetch(pool),
            Target::Connection(conn) => query.fetch(conn),
        }
    }
}

/// Statement building and error mapping shared by a context and its transactions
#[derive(Debug)]
pub struct ContextSettings {
    pub statements: StatementBuilder,
    pub messages: ErrorMessages,
}

/// Table mapping and error catalog for a new context
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub tables: TableMap,
    pub messages: ErrorMessages,
}

impl ContextOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tables: TableMap::from(config.tables.clone()),
            messages: ErrorMessages::new(config.errors.locale.clone())
                .with_messages(config.errors.messages.clone()),
        }
    }
}

fn validate_sql(sql: &str) -> DbResult<()> {
    if sql.trim().is_empty() {
        return Err(TranslateError::EmptySql.into());
    }
    Ok(())
}

async fn run_execute<C>(ctx: &mut C, query: &QueryDescriptor) -> DbResult<u64>
where
    C: DataContext + ?Sized,
{
    debug!("Executing: {}", query.sql);
    let args = query.arguments()?;
    let result = ctx.target().execute(&query.sql, args).await;
    result.map(|r| r.rows_affected()).map_err(|e| {
        log_error!("Statement failed: {}", e);
        ctx.settings().messages.wrap(e)
    })
}

async fn run_fetch_all<C, T>(ctx: &mut C, query: &QueryDescriptor) -> DbResult<Vec<T>>
where
    C: DataContext + ?Sized,
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    debug!("Querying: {}", query.sql);
    let args = query.arguments()?;
    let result = ctx.target().fetch_all::<T>(&query.sql, args).await;
    result.map_err(|e| {
        log_error!("Query failed: {}", e);
        ctx.settings().messages.wrap(e)
    })
}

async fn run_fetch_optional<C, T>(ctx: &mut C, query: &QueryDescriptor) -> DbResult<Option<T>>
where
    C: DataContext + ?Sized,
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    debug!("Querying: {}", query.sql);
    let args = query.arguments()?;
    let result = ctx.target().fetch_optional::<T>(&query.sql, args).await;
    result.map_err(|e| {
        log_error!("Query failed: {}", e);
        ctx.settings().messages.wrap(e)
    })
}

async fn run_count<C>(ctx: &mut C, query: &QueryDescriptor) -> DbResult<i64>
where
    C: DataContext + ?Sized,
{
    debug!("Counting: {}", query.sql);
    let args = query.arguments()?;
    let result = ctx.target().fetch_count(&query.sql, args).await;
    result.map_err(|e| {
        log_error!("Scalar query failed: {}", e);
        ctx.settings().messages.wrap(e)
    })
}

/// Generic CRUD over any [`Entity`]
///
/// Argument validation (null keys, empty SQL, bad identifiers) always
/// happens before a statement reaches the database.
#[async_trait]
pub trait DataContext: Send {
    fn settings(&self) -> &Arc<ContextSettings>;

    fn target(&mut self) -> Target<'_>;

    /// Insert one entity; true when a row was written
    async fn create<T: Entity>(&mut self, entity: &T) -> DbResult<bool> {
        let query = self.settings().statements.insert(entity)?;
        Ok(run_execute(self, &query).await? > 0)
    }

    /// Insert all entities in one statement; returns the driver's row count
    async fn create_many<T: Entity>(&mut self, entities: &[T]) -> DbResult<u64> {
        match self.settings().statements.insert_many(entities)? {
            Some(query) => run_execute(self, &query).await,
            None => Ok(0),
        }
    }

    async fn update<T: Entity>(&mut self, entity: &T) -> DbResult<bool> {
        let query = self.settings().statements.update(entity)?;
        Ok(run_execute(self, &query).await? > 0)
    }

    async fn delete<T: Entity>(&mut self, entity: &T) -> DbResult<bool> {
        let query = self.settings().statements.delete(entity)?;
        Ok(run_execute(self, &query).await? > 0)
    }

    async fn get_by_key_id<T: Entity>(&mut self, id: Value) -> DbResult<Option<T>> {
        let query = self.settings().statements.select_by_key::<T>(id)?;
        run_fetch_optional(self, &query).await
    }

    /// Matching entities ordered by key
    async fn get_list<T: Entity>(&mut self, filter: Option<&Filter>) -> DbResult<Vec<T>> {
        let query = self.settings().statements.select::<T>(filter, None)?;
        run_fetch_all(self, &query).await
    }

    async fn get_page<T: Entity>(
        &mut self,
        filter: Option<&Filter>,
        page: Pagination,
    ) -> DbResult<Vec<T>> {
        let query = self.settings().statements.select::<T>(filter, Some(page))?;
        run_fetch_all(self, &query).await
    }

    async fn get_first_or_default<T: Entity>(
        &mut self,
        filter: Option<&Filter>,
    ) -> DbResult<Option<T>> {
        let query = self.settings().statements.select_first::<T>(filter)?;
        run_fetch_optional(self, &query).await
    }

    async fn exist<T: Entity>(&mut self, filter: Option<&Filter>) -> DbResult<bool> {
        let query = self.settings().statements.exists::<T>(filter)?;
        Ok(run_count(self, &query).await? > 0)
    }

    async fn count<T: Entity>(&mut self, filter: Option<&Filter>) -> DbResult<u64> {
        let query = self.settings().statements.count::<T>(filter)?;
        Ok(run_count(self, &query).await?.max(0) as u64)
    }

    /// Raw SQL mapped onto `T`, streamed lazily
    fn sql_query<'a, T>(
        &'a mut self,
        sql: &'a str,
        params: Vec<Value>,
    ) -> DbResult<BoxStream<'a, DbResult<T>>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin + 'a,
    {
        validate_sql(sql)?;
        let args = bind_all(&params)?;
        let settings = Arc::clone(self.settings());
        debug!("Streaming: {}", sql);
        let rows = self
            .target()
            .fetch::<T>(sql, args)
            .map(move |row| row.map_err(|e| settings.messages.wrap(e)));
        Ok(rows.boxed())
    }

    /// Raw SQL mapped onto `T`, collected
    async fn sql_query_list<T>(&mut self, sql: &str, params: Vec<Value>) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        validate_sql(sql)?;
        run_fetch_all(self, &QueryDescriptor::new(sql, params)).await
    }

    /// Raw statement; returns the affected row count
    async fn execute_sql(&mut self, sql: &str, params: Vec<Value>) -> DbResult<u64> {
        validate_sql(sql)?;
        run_execute(self, &QueryDescriptor::new(sql, params)).await
    }
}

/// Pool-backed data context
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: AnyPool,
    settings: Arc<ContextSettings>,
}

impl DbContext {
    pub fn new(pool: AnyPool, dialect: Dialect, options: ContextOptions) -> Self {
        Self {
            pool,
            settings: Arc::new(ContextSettings {
                statements: StatementBuilder::new(dialect, options.tables),
                messages: options.messages,
            }),
        }
    }

    /// Create the connection source through `factory`
    pub async fn connect<F>(factory: &F, options: ContextOptions) -> DbResult<Self>
    where
        F: ConnectionFactory + ?Sized,
    {
        let dialect = Dialect::from_url(factory.connection_string())?;
        let pool = factory.create_pool().await?;
        info!(
            "Data context ready: dialect={}, mapped_tables={}",
            dialect,
            options.tables.len()
        );
        Ok(Self::new(pool, dialect, options))
    }

    pub async fn from_config(config: &Config) -> DbResult<Self> {
        let factory = PooledConnectionFactory::new(&config.database.url, config.pool_config());
        Self::connect(&factory, ContextOptions::from_config(config)).await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.settings.statements.dialect()
    }

    /// A handle with no transaction open yet
    pub fn unit_of_work(&self) -> DbTransaction {
        DbTransaction::new(self.pool.clone(), Arc::clone(&self.settings))
    }

    pub async fn begin_transaction(
        &self,
        isolation: Option<IsolationLevel>,
    ) -> DbResult<DbTransaction> {
        let mut transaction = self.unit_of_work();
        transaction.begin(isolation).await?;
        Ok(transaction)
    }

    /// Close the pool; safe to call more than once
    pub async fn close(&self) {
        if self.pool.is_closed() {
            debug!("Data context already closed");
            return;
        }
        info!("Closing data context");
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl DataContext for DbContext {
    fn settings(&self) -> &Arc<ContextSettings> {
        &self.settings
    }

    fn target(&mut self) -> Target<'_> {
        Target::Pool(&self.pool)
    }
}
