//! Filter → SQL translation
//!
//! The [`Translator`] walks a [`Filter`] and emits a WHERE fragment whose
//! literals are all bound as parameters. Identifiers are validated and quoted;
//! anything that does not look like a plain SQL identifier is rejected rather
//! than escaped.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::any::AnyArguments;
use sqlx::Arguments;
use thiserror::Error;

use crate::database::entity::Value;
use crate::database::error::{DatabaseError, DbResult};
use crate::database::filter::{CompareOp, Filter};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("invalid identifier: '{name}'")]
    InvalidIdentifier { name: String },

    #[error("LIKE requires a text pattern for column '{column}'")]
    InvalidPattern { column: String },

    #[error("SQL text must not be empty")]
    EmptySql,
}

impl TranslateError {
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }

    pub fn invalid_pattern(column: impl Into<String>) -> Self {
        Self::InvalidPattern {
            column: column.into(),
        }
    }

    /// The argument the error should be reported against
    pub fn argument(&self) -> &str {
        match self {
            TranslateError::InvalidIdentifier { .. } => "identifier",
            TranslateError::InvalidPattern { .. } => "filter",
            TranslateError::EmptySql => "sql",
        }
    }
}

/// Placeholder and quoting rules of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL scheme
    pub fn from_url(url: &str) -> DbResult<Self> {
        let url = url.trim();
        if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(DatabaseError::config(format!(
                "Unsupported database URL scheme '{}'",
                scheme
            )))
        }
    }

    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => format!("?{}", index),
        }
    }

    /// Placeholder for `value`, cast to its native type where the value is
    /// sent as text but the column is not
    pub fn typed_placeholder(&self, index: usize, value: &Value) -> String {
        let placeholder = self.placeholder(index);
        match (self, value) {
            (Dialect::Postgres, Value::Uuid(_)) => format!("{}::uuid", placeholder),
            (Dialect::Postgres, Value::Timestamp(_)) => format!("{}::timestamptz", placeholder),
            _ => placeholder,
        }
    }

    /// Validate and quote an identifier; dots separate schema-qualified parts
    pub fn quote_identifier(&self, name: &str) -> Result<String, TranslateError> {
        let name = name.trim();
        let parts = name
            .split('.')
            .map(|part| {
                if IDENTIFIER.is_match(part) {
                    Ok(format!("\"{}\"", part))
                } else {
                    Err(TranslateError::invalid_identifier(name))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join("."))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// SQL text plus its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryDescriptor {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn arguments(&self) -> DbResult<AnyArguments<'static>> {
        bind_all(&self.params)
    }
}

/// Build driver arguments from parameter values
pub fn bind_all(params: &[Value]) -> DbResult<AnyArguments<'static>> {
    let mut args = AnyArguments::default();
    for value in params {
        let added = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(b) => args.add(*b),
            Value::Int(i) => args.add(*i),
            Value::Float(x) => args.add(*x),
            Value::Text(s) => args.add(s.clone()),
            Value::Bytes(b) => args.add(b.clone()),
            Value::Uuid(id) => args.add(id.hyphenated().to_string()),
            Value::Timestamp(ts) => args.add(ts.to_rfc3339()),
        };
        added.map_err(|e| DatabaseError::validation("params", e.to_string()))?;
    }
    Ok(args)
}

/// Filter visitor accumulating bound parameters
#[derive(Debug)]
pub struct Translator {
    dialect: Dialect,
    params: Vec<Value>,
}

impl Translator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    /// Bind a value and return its placeholder
    pub fn bind(&mut self, value: Value) -> String {
        let placeholder = self.dialect.typed_placeholder(self.params.len() + 1, &value);
        self.params.push(value);
        placeholder
    }

    /// SQL for a written column value: the `NULL` keyword for nulls, so the
    /// column type decides, otherwise a bound placeholder
    pub fn write_value(&mut self, value: Value) -> String {
        if value.is_null() {
            "NULL".to_string()
        } else {
            self.bind(value)
        }
    }

    pub fn quote(&self, name: &str) -> Result<String, TranslateError> {
        self.dialect.quote_identifier(name)
    }

    /// ` WHERE ...` for a filter, or an empty string when there is none
    pub fn where_clause(&mut self, filter: Option<&Filter>) -> Result<String, TranslateError> {
        match filter {
            Some(filter) => Ok(format!(" WHERE {}", self.visit(filter)?)),
            None => Ok(String::new()),
        }
    }

    pub fn visit(&mut self, filter: &Filter) -> Result<String, TranslateError> {
        match filter {
            Filter::Compare { column, op, value } => self.visit_compare(column, *op, value),
            Filter::In {
                column,
                values,
                negated,
            } => self.visit_in(column, values, *negated),
            Filter::IsNull { column, negated } => {
                let column = self.quote(column)?;
                if *negated {
                    Ok(format!("{} IS NOT NULL", column))
                } else {
                    Ok(format!("{} IS NULL", column))
                }
            }
            Filter::And(items) => self.visit_junction(items, "AND", "1 = 1"),
            Filter::Or(items) => self.visit_junction(items, "OR", "1 = 0"),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.visit(inner)?)),
        }
    }

    fn visit_compare(
        &mut self,
        column: &str,
        op: CompareOp,
        value: &Value,
    ) -> Result<String, TranslateError> {
        let quoted = self.quote(column)?;
        match (op, value) {
            (CompareOp::Equal, Value::Null) => Ok(format!("{} IS NULL", quoted)),
            (CompareOp::NotEqual, Value::Null) => Ok(format!("{} IS NOT NULL", quoted)),
            (CompareOp::Like, Value::Text(_)) => {
                let placeholder = self.bind(value.clone());
                Ok(format!("{} LIKE {}", quoted, placeholder))
            }
            (CompareOp::Like, _) => Err(TranslateError::invalid_pattern(column)),
            (op, value) => {
                let placeholder = self.bind(value.clone());
                Ok(format!("{} {} {}", quoted, op.as_sql(), placeholder))
            }
        }
    }

    fn visit_in(
        &mut self,
        column: &str,
        values: &[Value],
        negated: bool,
    ) -> Result<String, TranslateError> {
        let quoted = self.quote(column)?;
        if values.is_empty() {
            // x IN () matches nothing, x NOT IN () matches everything
            return Ok(if negated { "1 = 1" } else { "1 = 0" }.to_string());
        }

        let placeholders = values
            .iter()
            .map(|v| self.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(", ");
        let keyword = if negated { "NOT IN" } else { "IN" };
        Ok(format!("{} {} ({})", quoted, keyword, placeholders))
    }

    fn visit_junction(
        &mut self,
        items: &[Filter],
        keyword: &str,
        empty: &str,
    ) -> Result<String, TranslateError> {
        match items {
            [] => Ok(empty.to_string()),
            [single] => self.visit(single),
            many => {
                let parts = many
                    .iter()
                    .map(|f| self.visit(f))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(&format!(" {} ", keyword))))
            }
        }
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

/// Translate a filter against a table into a SELECT descriptor
pub fn translate(
    dialect: Dialect,
    table: &str,
    filter: Option<&Filter>,
) -> Result<QueryDescriptor, TranslateError> {
    let mut translator = Translator::new(dialect);
    let table = translator.quote(table)?;
    let where_clause = translator.where_clause(filter)?;
    Ok(QueryDescriptor::new(
        format!("SELECT * FROM {}{}", table, where_clause),
        translator.into_params(),
    ))
}
