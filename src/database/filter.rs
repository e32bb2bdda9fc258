//! Filter expressions over entity columns
//!
//! A [`Filter`] is a small boolean AST that the translator turns into a
//! parameterized WHERE clause. Values never appear in the SQL text.
//!
//! ```
//! use sqlcontext::database::filter::{Column, Filter};
//!
//! const AGE: Column<i64> = Column::new("age");
//!
//! let adults = AGE.gte(18) & Filter::is_not_null("email");
//! let either = Filter::eq("status", "active") | Filter::eq("status", "trial");
//! let filter = adults.and(either);
//! # let _ = filter;
//! ```

use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

use crate::database::entity::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEqual => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Equal, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::NotEqual, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::LessThan, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::LessThanOrEqual, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::GreaterThan, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::GreaterThanOrEqual, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, CompareOp::Like, Value::Text(pattern.into()))
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
            negated: false,
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
            negated: true,
        }
    }

    /// Conjunction of all filters; empty means "match everything"
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    /// Disjunction of all filters; empty means "match nothing"
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut items) => {
                items.push(other);
                Filter::And(items)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut items) => {
                items.push(other);
                Filter::Or(items)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

/// A typed column handle; comparisons only accept values of `V`
#[derive(Debug)]
pub struct Column<V> {
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Column<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Column<V> {}

impl<V: Into<Value>> Column<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn eq(self, value: V) -> Filter {
        Filter::eq(self.name, value)
    }

    pub fn ne(self, value: V) -> Filter {
        Filter::ne(self.name, value)
    }

    pub fn lt(self, value: V) -> Filter {
        Filter::lt(self.name, value)
    }

    pub fn lte(self, value: V) -> Filter {
        Filter::lte(self.name, value)
    }

    pub fn gt(self, value: V) -> Filter {
        Filter::gt(self.name, value)
    }

    pub fn gte(self, value: V) -> Filter {
        Filter::gte(self.name, value)
    }

    pub fn is_in(self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::is_in(self.name, values)
    }

    pub fn is_null(self) -> Filter {
        Filter::is_null(self.name)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::is_not_null(self.name)
    }
}

impl Column<String> {
    pub fn like(self, pattern: impl Into<String>) -> Filter {
        Filter::like(self.name, pattern)
    }
}
