//! Planner-level error taxonomy.

use crate::model::task::{TaskId, ValidationError};
use crate::repo::{BatchItemFailure, StoreError};
use crate::session::AuthError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PlannerResult<T> = Result<T, PlannerError>;

/// Errors returned by planner commands.
#[derive(Debug)]
pub enum PlannerError {
    /// Session check failed; nothing was changed.
    Auth(AuthError),
    /// Input rejected before any state change.
    Validation(ValidationError),
    /// Target task is not in local state or not in the store.
    NotFound(TaskId),
    /// Store failed; local state was handled per the command's rollback rule.
    Store(StoreError),
    /// Reorder needs a running tokio runtime to schedule its write.
    RuntimeUnavailable,
}

impl PlannerError {
    /// Failed store items, when the error is an independent batch failure.
    pub fn batch_failures(&self) -> Option<&[BatchItemFailure]> {
        match self {
            Self::Store(StoreError::PartialBatch(failures)) => Some(failures),
            _ => None,
        }
    }
}

impl Display for PlannerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::RuntimeUnavailable => write!(f, "reorder requires a running tokio runtime"),
        }
    }
}

impl Error for PlannerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AuthError> for PlannerError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<ValidationError> for PlannerError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for PlannerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) => Self::Validation(err),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}
