//! Goal domain model.
//!
//! Goals are a flat, unscoped list with one global ordering. Positions are
//! unique and contiguous from 0 across the whole collection.

use crate::model::task::{validate_content, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable goal identifier.
pub type GoalId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub content: String,
    pub completed: bool,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Field-level goal update. A `position` change moves the goal and reindexes
/// the rest of the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl GoalPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        if let Some(position) = self.position {
            if position < 0 {
                return Err(ValidationError::NegativePosition(position));
            }
        }
        Ok(())
    }
}
