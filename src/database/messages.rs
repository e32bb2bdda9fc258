//! Vendor error-code catalog
//!
//! Maps PostgreSQL SQLSTATE codes and SQLite extended result codes onto a
//! [`ErrorClass`] and a human-readable message. Messages can be replaced per
//! code (for another locale, or wording closer to the application) and new
//! codes can be added from configuration.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::database::error::{ConstraintKind, DatabaseError, DatabaseErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Constraint(ConstraintKind),
    /// Worth retrying: serialization failures, deadlocks, busy/locked databases
    Transient,
    /// Recognized, but neither a constraint nor transient
    Other,
}

struct VendorCode {
    code: &'static str,
    class: ErrorClass,
    message: &'static str,
}

const DEFAULT_CODES: &[VendorCode] = &[
    // PostgreSQL
    VendorCode {
        code: "23505",
        class: ErrorClass::Constraint(ConstraintKind::Unique),
        message: "A record with the same unique value already exists",
    },
    VendorCode {
        code: "23503",
        class: ErrorClass::Constraint(ConstraintKind::ForeignKey),
        message: "The operation references a record that does not exist",
    },
    VendorCode {
        code: "23502",
        class: ErrorClass::Constraint(ConstraintKind::NotNull),
        message: "A required value is missing",
    },
    VendorCode {
        code: "23514",
        class: ErrorClass::Constraint(ConstraintKind::Check),
        message: "A value does not satisfy a check constraint",
    },
    VendorCode {
        code: "40001",
        class: ErrorClass::Transient,
        message: "The transaction could not be serialized; please retry",
    },
    VendorCode {
        code: "40P01",
        class: ErrorClass::Transient,
        message: "A deadlock was detected; please retry",
    },
    VendorCode {
        code: "57014",
        class: ErrorClass::Other,
        message: "The statement was canceled",
    },
    // SQLite extended result codes
    VendorCode {
        code: "2067",
        class: ErrorClass::Constraint(ConstraintKind::Unique),
        message: "A record with the same unique value already exists",
    },
    VendorCode {
        code: "1555",
        class: ErrorClass::Constraint(ConstraintKind::PrimaryKey),
        message: "A record with the same key already exists",
    },
    VendorCode {
        code: "787",
        class: ErrorClass::Constraint(ConstraintKind::ForeignKey),
        message: "The operation references a record that does not exist",
    },
    VendorCode {
        code: "1299",
        class: ErrorClass::Constraint(ConstraintKind::NotNull),
        message: "A required value is missing",
    },
    VendorCode {
        code: "275",
        class: ErrorClass::Constraint(ConstraintKind::Check),
        message: "A value does not satisfy a check constraint",
    },
    VendorCode {
        code: "5",
        class: ErrorClass::Transient,
        message: "The database is busy; please retry",
    },
    VendorCode {
        code: "6",
        class: ErrorClass::Transient,
        message: "The database table is locked; please retry",
    },
];

/// Resolves vendor error codes to localized messages
#[derive(Debug, Clone)]
pub struct ErrorMessages {
    locale: String,
    overrides: HashMap<String, String>,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self::new("en")
    }
}

impl ErrorMessages {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_messages(mut self, messages: HashMap<String, String>) -> Self {
        self.overrides.extend(messages);
        self
    }

    pub fn with_message(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.overrides.insert(code.into(), message.into());
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Class and message for `code`, if the catalog knows it
    pub fn resolve(&self, code: &str) -> Option<(ErrorClass, String)> {
        let builtin = DEFAULT_CODES.iter().find(|c| c.code == code);
        let message = self
            .overrides
            .get(code)
            .cloned()
            .or_else(|| builtin.map(|c| c.message.to_string()))?;
        let class = builtin.map(|c| c.class).unwrap_or(ErrorClass::Other);
        Some((class, message))
    }

    /// Convert a driver error into a domain error
    ///
    /// Database errors whose code the catalog recognizes become
    /// `ConstraintViolation` or `DataAccess` with the catalog message.
    /// Everything else goes through [`DatabaseError::from_sqlx`] and keeps the
    /// driver's own message.
    pub fn wrap(&self, error: sqlx::Error) -> DatabaseError {
        let resolved = match &error {
            sqlx::Error::Database(db_err) => db_err.code().and_then(|code| {
                self.resolve(&code)
                    .map(|(class, message)| (code.into_owned(), class, message))
            }),
            _ => None,
        };

        let Some((code, class, message)) = resolved else {
            debug!("Unrecognized driver error, passing through: {}", error);
            return DatabaseError::from_sqlx(error);
        };

        warn!("Database error {} ({}): {}", code, self.locale, message);
        let mapped = match class {
            ErrorClass::Constraint(constraint) => {
                DatabaseError::new(DatabaseErrorKind::ConstraintViolation {
                    constraint,
                    code,
                    message,
                })
            }
            ErrorClass::Transient => {
                DatabaseError::new(DatabaseErrorKind::DataAccess { code, message }).retryable(true)
            }
            ErrorClass::Other => DatabaseError::new(DatabaseErrorKind::DataAccess { code, message }),
        };
        mapped.with_source(error)
    }
}
