//! Entity statements
//!
//! [`StatementBuilder`] resolves an entity's table and renders the INSERT,
//! UPDATE, DELETE and SELECT descriptors the context executes. All argument
//! validation happens here, before a connection is touched.

use tracing::debug;

use crate::database::entity::{Entity, TableMap, Value};
use crate::database::error::{DatabaseError, DbResult};
use crate::database::filter::Filter;
use crate::database::translator::{Dialect, QueryDescriptor, TranslateError, Translator};

/// Offset/limit page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Zero-based page of `page_size` rows; an offset past `u64::MAX`
    /// saturates and is rejected when the statement is built
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        Self {
            offset: page_number.saturating_mul(page_size),
            limit: page_size,
        }
    }
}

fn page_bound(argument: &str, value: u64) -> DbResult<i64> {
    i64::try_from(value).map_err(|_| {
        DatabaseError::validation(
            "pagination",
            format!("{} {} exceeds the largest supported value", argument, value),
        )
    })
}

#[derive(Debug, Clone)]
pub struct StatementBuilder {
    dialect: Dialect,
    tables: TableMap,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect, tables: TableMap) -> Self {
        Self { dialect, tables }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The resolved table name for `T`
    pub fn table<T: Entity>(&self) -> String {
        self.tables.resolve::<T>()
    }

    fn quoted_table<T: Entity>(&self) -> DbResult<String> {
        let table = self.table::<T>();
        Ok(self.dialect.quote_identifier(&table)?)
    }

    fn insert_columns<T: Entity>(entity: &T) -> DbResult<Vec<(&'static str, Value)>> {
        let key = entity.key();
        let mut columns = Vec::new();
        if key.is_null() {
            if !T::GENERATED_KEY {
                return Err(DatabaseError::validation(
                    "entity",
                    format!("key column '{}' must not be null", T::KEY),
                ));
            }
        } else {
            columns.push((T::KEY, key));
        }
        columns.extend(entity.columns());

        if columns.is_empty() {
            return Err(DatabaseError::validation("entity", "no columns to insert"));
        }
        Ok(columns)
    }

    fn require_key<T: Entity>(entity: &T) -> DbResult<Value> {
        let key = entity.key();
        if key.is_null() {
            return Err(DatabaseError::validation(
                "entity",
                format!("key column '{}' must not be null", T::KEY),
            ));
        }
        Ok(key)
    }

    pub fn insert<T: Entity>(&self, entity: &T) -> DbResult<QueryDescriptor> {
        let columns = Self::insert_columns(entity)?;
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);

        let mut names = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            names.push(translator.quote(name)?);
            placeholders.push(translator.write_value(value));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        );
        debug!("Built insert statement: {}", sql);
        Ok(QueryDescriptor::new(sql, translator.into_params()))
    }

    /// Multi-row INSERT; every entity must produce the same column list.
    /// Returns `None` for an empty slice.
    pub fn insert_many<T: Entity>(&self, entities: &[T]) -> DbResult<Option<QueryDescriptor>> {
        let Some(first) = entities.first() else {
            return Ok(None);
        };

        let first_columns: Vec<&'static str> = Self::insert_columns(first)?
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let names = first_columns
            .iter()
            .map(|name| translator.quote(name))
            .collect::<Result<Vec<_>, TranslateError>>()?;

        let mut rows = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            let columns = Self::insert_columns(entity)?;
            let same_shape = columns.len() == first_columns.len()
                && columns.iter().zip(&first_columns).all(|((a, _), b)| a == b);
            if !same_shape {
                return Err(DatabaseError::validation(
                    "entities",
                    format!("entity at index {} has a different column set", index),
                ));
            }
            let placeholders = columns
                .into_iter()
                .map(|(_, value)| translator.write_value(value))
                .collect::<Vec<_>>();
            rows.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            names.join(", "),
            rows.join(", ")
        );
        Ok(Some(QueryDescriptor::new(sql, translator.into_params())))
    }

    pub fn update<T: Entity>(&self, entity: &T) -> DbResult<QueryDescriptor> {
        let key = Self::require_key(entity)?;
        let columns = entity.columns();
        if columns.is_empty() {
            return Err(DatabaseError::validation("entity", "no columns to update"));
        }

        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let mut assignments = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            let column = translator.quote(name)?;
            assignments.push(format!("{} = {}", column, translator.write_value(value)));
        }
        let key_column = translator.quote(T::KEY)?;
        let key_placeholder = translator.bind(key);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            table,
            assignments.join(", "),
            key_column,
            key_placeholder
        );
        debug!("Built update statement: {}", sql);
        Ok(QueryDescriptor::new(sql, translator.into_params()))
    }

    pub fn delete<T: Entity>(&self, entity: &T) -> DbResult<QueryDescriptor> {
        let key = Self::require_key(entity)?;
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let key_column = translator.quote(T::KEY)?;
        let placeholder = translator.bind(key);

        Ok(QueryDescriptor::new(
            format!("DELETE FROM {} WHERE {} = {}", table, key_column, placeholder),
            translator.into_params(),
        ))
    }

    pub fn select_by_key<T: Entity>(&self, id: Value) -> DbResult<QueryDescriptor> {
        if id.is_null() {
            return Err(DatabaseError::validation("id", "key must not be null"));
        }
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let key_column = translator.quote(T::KEY)?;
        let placeholder = translator.bind(id);

        Ok(QueryDescriptor::new(
            format!("SELECT * FROM {} WHERE {} = {}", table, key_column, placeholder),
            translator.into_params(),
        ))
    }

    /// SELECT ordered by key, optionally paged
    pub fn select<T: Entity>(
        &self,
        filter: Option<&Filter>,
        page: Option<Pagination>,
    ) -> DbResult<QueryDescriptor> {
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let where_clause = translator.where_clause(filter)?;
        let key_column = translator.quote(T::KEY)?;

        let mut sql = format!(
            "SELECT * FROM {}{} ORDER BY {}",
            table, where_clause, key_column
        );
        if let Some(page) = page {
            if page.limit == 0 {
                return Err(DatabaseError::validation(
                    "pagination",
                    "limit must be greater than 0",
                ));
            }
            let limit = page_bound("limit", page.limit)?;
            let offset = page_bound("offset", page.offset)?;
            let limit = translator.bind(Value::Int(limit));
            let offset = translator.bind(Value::Int(offset));
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        Ok(QueryDescriptor::new(sql, translator.into_params()))
    }

    pub fn select_first<T: Entity>(&self, filter: Option<&Filter>) -> DbResult<QueryDescriptor> {
        self.select::<T>(filter, Some(Pagination::new(0, 1)))
    }

    /// Scalar presence probe: 1 when any row matches, otherwise 0
    pub fn exists<T: Entity>(&self, filter: Option<&Filter>) -> DbResult<QueryDescriptor> {
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let where_clause = translator.where_clause(filter)?;

        Ok(QueryDescriptor::new(
            format!(
                "SELECT COUNT(1) FROM (SELECT 1 FROM {}{} LIMIT 1) AS probe",
                table, where_clause
            ),
            translator.into_params(),
        ))
    }

    pub fn count<T: Entity>(&self, filter: Option<&Filter>) -> DbResult<QueryDescriptor> {
        let table = self.quoted_table::<T>()?;
        let mut translator = Translator::new(self.dialect);
        let where_clause = translator.where_clause(filter)?;

        Ok(QueryDescriptor::new(
            format!("SELECT COUNT(1) FROM {}{}", table, where_clause),
            translator.into_params(),
        ))
    }
}
