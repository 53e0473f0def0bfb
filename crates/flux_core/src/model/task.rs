//! Weekly task domain model.
//!
//! # Responsibility
//! - Define the `Task` record and its insert/patch command shapes.
//! - Validate content and scope fields before any persistence call.
//!
//! # Invariants
//! - `content` is non-blank after trim.
//! - `day_of_week` is within `0..=6` (0 = Sunday).
//! - `parent_task_id = None` marks a top-level task; only top-level tasks
//!   carry a meaningful `position`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// Highest valid `day_of_week` value (Saturday).
pub const MAX_DAY_OF_WEEK: u8 = 6;

/// Position written for every subtask. Sibling order under a parent is
/// insertion order, not position order.
pub const SUBTASK_PLACEHOLDER_POSITION: i64 = 0;

/// One planning item scoped to a `(week_offset, day_of_week)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub content: String,
    pub day_of_week: u8,
    pub week_offset: i32,
    pub completed: bool,
    pub parent_task_id: Option<TaskId>,
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Returns whether this task sits at the root of its day forest.
    pub fn is_top_level(&self) -> bool {
        self.parent_task_id.is_none()
    }

    /// Returns whether this task belongs to the given week/day scope.
    pub fn in_scope(&self, week_offset: i32, day_of_week: u8) -> bool {
        self.week_offset == week_offset && self.day_of_week == day_of_week
    }

    /// Applies a validated patch in place. Does not touch `updated_at`.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(content) = &patch.content {
            self.content = content.trim().to_string();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(day_of_week) = patch.day_of_week {
            self.day_of_week = day_of_week;
        }
        if let Some(week_offset) = patch.week_offset {
            self.week_offset = week_offset;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
    }
}

/// Insert command for one task. `id`, timestamps and `position` are assigned
/// by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub content: String,
    pub day_of_week: u8,
    pub week_offset: i32,
    pub parent_task_id: Option<TaskId>,
}

impl NewTask {
    /// Creates a top-level insert command.
    pub fn top_level(content: impl Into<String>, day_of_week: u8, week_offset: i32) -> Self {
        Self {
            content: content.into(),
            day_of_week,
            week_offset,
            parent_task_id: None,
        }
    }

    /// Creates a subtask insert command in the parent's scope.
    pub fn subtask(parent: &Task, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            day_of_week: parent.day_of_week,
            week_offset: parent.week_offset,
            parent_task_id: Some(parent.id),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_content(&self.content)?;
        validate_day_of_week(self.day_of_week)
    }
}

/// Field-level update command. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub day_of_week: Option<u8>,
    #[serde(default)]
    pub week_offset: Option<i32>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn day_of_week(day_of_week: u8) -> Self {
        Self {
            day_of_week: Some(day_of_week),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        if let Some(day_of_week) = self.day_of_week {
            validate_day_of_week(day_of_week)?;
        }
        if let Some(position) = self.position {
            if position < 0 {
                return Err(ValidationError::NegativePosition(position));
            }
        }
        Ok(())
    }
}

/// One `{id, position}` pair of a batch reorder write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: TaskId,
    pub position: i64,
}

/// Field validation failures for task and goal commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyContent,
    MissingDayOfWeek,
    /// Update/delete payload omitted the target id.
    MissingId,
    DayOfWeekOutOfRange(i64),
    NegativePosition(i64),
    /// Subtasks inherit their parent's week/day scope and cannot move alone.
    SubtaskScopeChange,
    /// A reorder listed an id that is not a top-level task of that day.
    UnknownTaskInOrdering(TaskId),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "content must not be blank"),
            Self::MissingDayOfWeek => write!(f, "day_of_week is required"),
            Self::MissingId => write!(f, "id is required"),
            Self::DayOfWeekOutOfRange(value) => {
                write!(f, "day_of_week must be within 0..=6, got {value}")
            }
            Self::NegativePosition(value) => {
                write!(f, "position must not be negative, got {value}")
            }
            Self::SubtaskScopeChange => {
                write!(f, "subtasks cannot change day_of_week or week_offset")
            }
            Self::UnknownTaskInOrdering(id) => {
                write!(f, "ordering contains unknown top-level task {id}")
            }
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(())
}

pub(crate) fn validate_day_of_week(day_of_week: u8) -> Result<(), ValidationError> {
    if day_of_week > MAX_DAY_OF_WEEK {
        return Err(ValidationError::DayOfWeekOutOfRange(i64::from(
            day_of_week,
        )));
    }
    Ok(())
}
