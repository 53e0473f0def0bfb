//! Request-level services for tasks and goals.
//!
//! # Responsibility
//! - Accept deserialized request payloads and map them onto store calls.
//! - Classify failures into status-coded `ServiceError`s.
//!
//! # Invariants
//! - The session is checked before the payload is looked at: 401 wins over
//!   400, which wins over 404/500.

pub mod goal_service;
pub mod task_service;

use crate::model::task::ValidationError;
use crate::repo::StoreError;
use crate::session::AuthError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Request failure with an HTTP-style status class.
#[derive(Debug)]
pub enum ServiceError {
    Auth(AuthError),
    Validation(ValidationError),
    NotFound(Uuid),
    /// Store failure, including independent batch failures.
    Store(StoreError),
}

/// Error payload returned to request callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Store(_) => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            Self::Auth(_) => "Unauthorized".to_string(),
            // Store internals stay in the log.
            Self::Store(StoreError::PartialBatch(_)) => self.to_string(),
            Self::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody { error }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) => Self::Validation(err),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::model::task::ValidationError;
    use crate::repo::{BatchItemFailure, StoreError};
    use crate::session::AuthError;
    use uuid::Uuid;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(ServiceError::from(AuthError::MissingSession).status_code(), 401);
        assert_eq!(
            ServiceError::from(ValidationError::EmptyContent).status_code(),
            400
        );
        let id = Uuid::new_v4();
        assert_eq!(ServiceError::from(StoreError::NotFound(id)).status_code(), 404);
        assert_eq!(
            ServiceError::from(StoreError::Backend("disk".to_string())).status_code(),
            500
        );
    }

    #[test]
    fn store_validation_maps_to_bad_request() {
        let err = ServiceError::from(StoreError::Validation(ValidationError::MissingDayOfWeek));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.body().error, "day_of_week is required");
    }

    #[test]
    fn partial_batch_body_lists_failed_ids() {
        let id = Uuid::new_v4();
        let err = ServiceError::from(StoreError::PartialBatch(vec![BatchItemFailure {
            id,
            message: "task not found".to_string(),
        }]));
        assert_eq!(err.status_code(), 500);
        assert!(err.body().error.contains(&id.to_string()));
        assert_eq!(
            ServiceError::from(StoreError::Backend("x".to_string()))
                .body()
                .error,
            "Internal server error"
        );
    }
}
