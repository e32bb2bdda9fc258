//! Generic data access over SQL databases.
//!
//! A [`DbContext`] wraps a `sqlx` connection pool and exposes create, read,
//! update, delete, existence checks and raw SQL for any type implementing
//! [`Entity`]. Filters are built as a [`Filter`] tree and translated into
//! parameterized SQL for the connected dialect. Transactions are explicit
//! [`DbTransaction`] handles.

pub mod config;
pub mod database;
pub mod logging;

pub use database::context::{ContextOptions, DataContext, DbContext};
pub use database::entity::{Entity, TableMap, Value};
pub use database::error::{DatabaseError, DatabaseErrorKind, DbResult};
pub use database::filter::{Column, Filter};
pub use database::repository::{EntityRepository, Repository, TransactionalRepository};
pub use database::statement::Pagination;
pub use database::transaction::{DbTransaction, IsolationLevel};
pub use database::translator::Dialect;
