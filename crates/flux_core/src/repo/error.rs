//! Store error taxonomy shared by task and goal stores.

use crate::db::DbError;
use crate::model::task::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// One failed item of a non-atomic batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemFailure {
    pub id: Uuid,
    pub message: String,
}

impl Display for BatchItemFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}

/// Errors from store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Command failed field validation; nothing was written.
    Validation(ValidationError),
    /// Target record (or referenced parent) does not exist.
    NotFound(Uuid),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Failure reported by a non-SQLite store backend.
    Backend(String),
    /// One or more items of an independent batch failed. Items not listed
    /// here were applied.
    PartialBatch(Vec<BatchItemFailure>),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl StoreError {
    /// Returns whether this error came from the storage backend rather than
    /// from the caller's input.
    pub fn is_persistence(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Backend(message) => write!(f, "store backend failure: {message}"),
            Self::PartialBatch(failures) => {
                let joined = failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(
                    f,
                    "batch position update failed for {} item(s): {joined}",
                    failures.len()
                )
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "store requires table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "store requires column `{column}` in table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
