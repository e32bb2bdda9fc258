use std::fmt;
use std::sync::Arc;

use crate::database::translator::TranslateError;

/// Which integrity rule a constraint violation broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    NotNull,
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        write!(f, "{}", name)
    }
}

/// Custom database error type for the data context
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// A required argument was missing or malformed; raised before any I/O
    Validation {
        argument: String,
        message: String,
    },
    /// An integrity constraint rejected the statement
    ConstraintViolation {
        constraint: ConstraintKind,
        code: String,
        message: String,
    },
    /// A recognized vendor error that is not a constraint (deadlock, busy, ...)
    DataAccess {
        code: String,
        message: String,
    },
    /// Record not found
    NotFound {
        entity: String,
        id: String,
    },
    /// Connection pool is exhausted
    PoolExhausted,
    /// Connection, TLS or protocol failure
    Transport {
        message: String,
    },
    /// Query execution error the catalog does not recognize
    QueryError {
        message: String,
    },
    /// A row could not be mapped onto the requested type
    Decode {
        message: String,
    },
    /// Configuration error
    ConfigError {
        message: String,
    },
    /// Unknown error
    Unknown {
        message: String,
    },
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
    pub is_retryable: bool,
    source: Option<Arc<sqlx::Error>>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        let is_retryable = matches!(
            kind,
            DatabaseErrorKind::PoolExhausted | DatabaseErrorKind::Transport { .. }
        );

        Self {
            kind,
            context: None,
            is_retryable,
            source: None,
        }
    }

    pub fn validation(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Validation {
            argument: argument.into(),
            message: message.into(),
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::ConfigError {
            message: message.into(),
        })
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub(crate) fn retryable(mut self, retryable: bool) -> Self {
        self.is_retryable = retryable;
        self
    }

    pub(crate) fn with_source(mut self, source: sqlx::Error) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.is_retryable
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::ConstraintViolation { .. })
    }

    /// The vendor error code carried by the error, if any
    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            DatabaseErrorKind::ConstraintViolation { code, .. }
            | DatabaseErrorKind::DataAccess { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The driver error this error was built from
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        self.source.as_deref()
    }

    /// Map SQLx error to our custom error type
    ///
    /// Vendor codes are not consulted here beyond the driver's own
    /// classification; see [`crate::database::messages::ErrorMessages::wrap`]
    /// for catalog-based mapping.
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let mapped = match &error {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            }),
            sqlx::Error::PoolTimedOut => Self::new(DatabaseErrorKind::PoolExhausted),
            sqlx::Error::PoolClosed => Self::new(DatabaseErrorKind::Transport {
                message: "Connection pool is closed".to_string(),
            }),
            sqlx::Error::Configuration(msg) => Self::new(DatabaseErrorKind::ConfigError {
                message: msg.to_string(),
            }),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                let constraint = match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                    sqlx::error::ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                    sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                    sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                    _ => None,
                };
                match constraint {
                    Some(constraint) => Self::new(DatabaseErrorKind::ConstraintViolation {
                        constraint,
                        code,
                        message: db_err.message().to_string(),
                    }),
                    None => Self::new(DatabaseErrorKind::QueryError {
                        message: db_err.message().to_string(),
                    }),
                }
            }
            sqlx::Error::Io(io_err) => Self::new(DatabaseErrorKind::Transport {
                message: io_err.to_string(),
            }),
            sqlx::Error::Tls(tls_err) => Self::new(DatabaseErrorKind::Transport {
                message: tls_err.to_string(),
            }),
            sqlx::Error::Protocol(msg) => Self::new(DatabaseErrorKind::Transport {
                message: msg.clone(),
            }),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => Self::new(DatabaseErrorKind::Decode {
                message: error.to_string(),
            }),
            _ => Self::new(DatabaseErrorKind::Unknown {
                message: error.to_string(),
            }),
        };

        mapped.with_source(error)
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        Self::from_sqlx(error)
    }
}

impl From<TranslateError> for DatabaseError {
    fn from(error: TranslateError) -> Self {
        let argument = error.argument().to_string();
        Self::validation(argument, error.to_string())
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            DatabaseErrorKind::Validation { argument, message } => {
                format!("Invalid argument '{}': {}", argument, message)
            }
            DatabaseErrorKind::ConstraintViolation {
                constraint,
                code,
                message,
            } => {
                if code.is_empty() {
                    format!("{} constraint violated: {}", constraint, message)
                } else {
                    format!("{} constraint violated [{}]: {}", constraint, code, message)
                }
            }
            DatabaseErrorKind::DataAccess { code, message } => {
                format!("Data access error [{}]: {}", code, message)
            }
            DatabaseErrorKind::NotFound { entity, id } => {
                format!("{} with ID '{}' not found", entity, id)
            }
            DatabaseErrorKind::PoolExhausted => {
                "Database connection pool exhausted. Please try again.".to_string()
            }
            DatabaseErrorKind::Transport { message } => {
                format!("Database connection error: {}", message)
            }
            DatabaseErrorKind::QueryError { message } => {
                format!("Database query failed: {}", message)
            }
            DatabaseErrorKind::Decode { message } => {
                format!("Failed to map row: {}", message)
            }
            DatabaseErrorKind::ConfigError { message } => {
                format!("Database configuration error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => {
                format!("Unknown database error: {}", message)
            }
        };

        if let Some(context) = &self.context {
            write!(f, "{} ({})", message, context)
        } else {
            write!(f, "{}", message)
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        // For testing purposes
        format!("{:?}", self.kind) == format!("{:?}", other.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = DatabaseError::validation("entity", "key must not be null");
        assert!(err.is_validation());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Invalid argument 'entity': key must not be null"
        );
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(matches!(err.kind, DatabaseErrorKind::PoolExhausted));
        assert!(err.is_retryable());
        assert!(err.driver_error().is_some());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_context_is_appended() {
        let err = DatabaseError::config("pool closed").with_context("orders");
        assert_eq!(
            err.to_string(),
            "Database configuration error: pool closed (orders)"
        );
    }

    #[test]
    fn test_source_is_exposed() {
        use std::error::Error;

        let err = DatabaseError::from_sqlx(sqlx::Error::PoolClosed);
        assert!(err.source().is_some());
        assert!(err.is_retryable());
    }
}
