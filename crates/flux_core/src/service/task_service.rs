//! Task request service.
//!
//! # Responsibility
//! - Serve list/create/patch/delete/batch-position requests for tasks.
//! - Turn loosely typed payload fields into validated store commands.
//!
//! # Invariants
//! - `week_offset` defaults to 0 when omitted.
//! - A create with `parent_task_id` takes the parent's scope; `day_of_week`
//!   may then be omitted.

use crate::model::task::{
    NewTask, PositionUpdate, Task, TaskId, TaskPatch, ValidationError, MAX_DAY_OF_WEEK,
};
use crate::planner::tree::{build_task_tree, TaskNode};
use crate::repo::task_repo::TaskStore;
use crate::service::{ServiceError, ServiceResult};
use crate::session::SessionGuard;
use serde::Deserialize;
use std::sync::Arc;

/// `GET` query for one week, optionally narrowed to a day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub week_offset: i32,
    #[serde(default)]
    pub day_of_week: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<i64>,
    #[serde(default)]
    pub week_offset: i32,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PatchTaskRequest {
    #[serde(default)]
    pub id: Option<TaskId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub day_of_week: Option<i64>,
    #[serde(default)]
    pub week_offset: Option<i32>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteTaskRequest {
    #[serde(default)]
    pub id: Option<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchPositionsRequest {
    pub updates: Vec<PositionUpdate>,
    /// Apply all pairs in one transaction instead of one by one.
    #[serde(default)]
    pub atomic: bool,
}

/// Request handlers over a task store.
pub struct TaskService<S: TaskStore> {
    store: S,
    guard: Arc<dyn SessionGuard>,
}

impl<S: TaskStore> TaskService<S> {
    pub fn new(store: S, guard: Arc<dyn SessionGuard>) -> Self {
        Self { store, guard }
    }

    pub async fn list(&self, token: Option<&str>, query: &ListTasksQuery) -> ServiceResult<Vec<Task>> {
        self.guard.verify(token)?;
        let day_filter = query.day_of_week.map(parse_day).transpose()?;
        let mut tasks = self.store.list_tasks(query.week_offset).await?;
        if let Some(day) = day_filter {
            tasks.retain(|task| task.day_of_week == day);
        }
        Ok(tasks)
    }

    /// Nested forest for one day.
    pub async fn day_tree(
        &self,
        token: Option<&str>,
        week_offset: i32,
        day_of_week: i64,
    ) -> ServiceResult<Vec<TaskNode>> {
        let query = ListTasksQuery {
            week_offset,
            day_of_week: Some(day_of_week),
        };
        let tasks = self.list(token, &query).await?;
        Ok(build_task_tree(&tasks))
    }

    pub async fn create(&self, token: Option<&str>, request: &CreateTaskRequest) -> ServiceResult<Task> {
        self.guard.verify(token)?;
        let content = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(ValidationError::EmptyContent)?;

        let new_task = match request.parent_task_id {
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_task(parent_id)
                    .await?
                    .ok_or(ServiceError::NotFound(parent_id))?;
                NewTask::subtask(&parent, content)
            }
            None => {
                let day = request
                    .day_of_week
                    .ok_or(ValidationError::MissingDayOfWeek)
                    .and_then(parse_day)?;
                NewTask::top_level(content, day, request.week_offset)
            }
        };
        Ok(self.store.insert_task(&new_task).await?)
    }

    pub async fn patch(&self, token: Option<&str>, request: &PatchTaskRequest) -> ServiceResult<Task> {
        self.guard.verify(token)?;
        let id = request.id.ok_or(ValidationError::MissingId)?;
        let patch = TaskPatch {
            content: request.content.clone(),
            completed: request.completed,
            day_of_week: request.day_of_week.map(parse_day).transpose()?,
            week_offset: request.week_offset,
            position: request.position,
        };
        patch.validate()?;
        Ok(self.store.update_task(id, &patch).await?)
    }

    pub async fn delete(&self, token: Option<&str>, request: &DeleteTaskRequest) -> ServiceResult<()> {
        self.guard.verify(token)?;
        let id = request.id.ok_or(ValidationError::MissingId)?;
        Ok(self.store.delete_task(id).await?)
    }

    pub async fn batch_positions(
        &self,
        token: Option<&str>,
        request: &BatchPositionsRequest,
    ) -> ServiceResult<()> {
        self.guard.verify(token)?;
        if request.updates.is_empty() {
            return Ok(());
        }
        if request.atomic {
            self.store
                .batch_update_positions_atomic(&request.updates)
                .await?;
        } else {
            self.store.batch_update_positions(&request.updates).await?;
        }
        Ok(())
    }
}

fn parse_day(value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|day| *day <= MAX_DAY_OF_WEEK)
        .ok_or(ValidationError::DayOfWeekOutOfRange(value))
}
