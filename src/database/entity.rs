//! Entity contract and dynamically typed SQL values
//!
//! An [`Entity`] describes how a Rust type maps onto a table: its key column,
//! whether the database generates the key, an optional explicit table name and
//! the column values written on insert/update. Rows come back through
//! `sqlx::FromRow` over [`AnyRow`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::FromRow;
use tracing::debug;

/// A dynamically typed SQL parameter
///
/// `Uuid` and `Timestamp` travel to the driver as text. On PostgreSQL the
/// generated placeholder carries a `::uuid` / `::timestamptz` cast so native
/// columns accept them; SQLite stores the text as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Uuid(id) => write!(f, "'{}'", id),
            Value::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(id: uuid::Uuid) -> Self {
        Value::Uuid(id)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            other => Value::Text(other.to_string()),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A persistable record type
///
/// ```ignore
/// #[derive(Debug, Clone, sqlx::FromRow)]
/// struct Customer { id: String, name: String, email: Option<String> }
///
/// impl Entity for Customer {
///     const TABLE: Option<&'static str> = Some("customers");
///
///     fn key(&self) -> Value { self.id.clone().into() }
///
///     fn columns(&self) -> Vec<(&'static str, Value)> {
///         vec![("name", self.name.clone().into()), ("email", self.email.clone().into())]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, AnyRow> + Send + Sync + Unpin + 'static {
    /// Explicit table name; blank or `None` falls back to the bare type name
    const TABLE: Option<&'static str> = None;

    /// Key column name
    const KEY: &'static str = "id";

    /// Whether the database assigns the key on insert
    const GENERATED_KEY: bool = false;

    /// The entity's key value; `Value::Null` when not yet assigned
    fn key(&self) -> Value;

    /// Non-key column values, in a stable order
    fn columns(&self) -> Vec<(&'static str, Value)>;
}

/// The unqualified name of `T`, without module path or generic arguments
pub fn bare_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Configured type → table mapping
///
/// Keys are bare type names, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TableMap {
    tables: HashMap<String, String>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, type_name: &str, table: &str) -> Self {
        self.insert(type_name, table);
        self
    }

    pub fn insert(&mut self, type_name: &str, table: &str) {
        self.tables
            .insert(type_name.trim().to_lowercase(), table.to_string());
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve the table for `T`: configured mapping, then `T::TABLE`, then
    /// the bare type name. Blank names at either step are skipped.
    pub fn resolve<T: Entity>(&self) -> String {
        let type_name = bare_type_name::<T>();

        let configured = self
            .tables
            .get(&type_name.to_lowercase())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty());
        if let Some(table) = configured {
            debug!("Resolved table for {} from mapping: {}", type_name, table);
            return table.to_string();
        }

        match T::TABLE.map(str::trim).filter(|t| !t.is_empty()) {
            Some(table) => table.to_string(),
            None => type_name.to_string(),
        }
    }
}

impl From<HashMap<String, String>> for TableMap {
    fn from(entries: HashMap<String, String>) -> Self {
        let mut map = TableMap::new();
        for (type_name, table) in &entries {
            map.insert(type_name, table);
        }
        map
    }
}
