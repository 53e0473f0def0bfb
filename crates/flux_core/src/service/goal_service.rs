//! Goal request service.

use crate::model::goal::{Goal, GoalId, GoalPatch};
use crate::model::task::ValidationError;
use crate::repo::goal_repo::GoalStore;
use crate::service::ServiceResult;
use crate::session::SessionGuard;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateGoalRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatchGoalRequest {
    #[serde(default)]
    pub id: Option<GoalId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteGoalRequest {
    #[serde(default)]
    pub id: Option<GoalId>,
}

/// Request handlers over a goal store.
pub struct GoalService<S: GoalStore> {
    store: S,
    guard: Arc<dyn SessionGuard>,
}

impl<S: GoalStore> GoalService<S> {
    pub fn new(store: S, guard: Arc<dyn SessionGuard>) -> Self {
        Self { store, guard }
    }

    pub async fn list(&self, token: Option<&str>) -> ServiceResult<Vec<Goal>> {
        self.guard.verify(token)?;
        Ok(self.store.list_goals().await?)
    }

    pub async fn create(&self, token: Option<&str>, request: &CreateGoalRequest) -> ServiceResult<Goal> {
        self.guard.verify(token)?;
        let content = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(ValidationError::EmptyContent)?;
        Ok(self.store.insert_goal(content).await?)
    }

    pub async fn patch(&self, token: Option<&str>, request: &PatchGoalRequest) -> ServiceResult<Goal> {
        self.guard.verify(token)?;
        let id = request.id.ok_or(ValidationError::MissingId)?;
        let patch = GoalPatch {
            content: request.content.clone(),
            completed: request.completed,
            position: request.position,
        };
        patch.validate()?;
        Ok(self.store.update_goal(id, &patch).await?)
    }

    pub async fn delete(&self, token: Option<&str>, request: &DeleteGoalRequest) -> ServiceResult<()> {
        self.guard.verify(token)?;
        let id = request.id.ok_or(ValidationError::MissingId)?;
        Ok(self.store.delete_goal(id).await?)
    }
}
