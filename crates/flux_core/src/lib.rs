//! Core of the Flux weekly planner.
//! Owns the task hierarchy, optimistic coordinators and persistence; UI
//! layers only render what this crate exposes.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod planner;
pub mod repo;
pub mod service;
pub mod session;
pub mod week;

pub use config::{BatchMode, ConfigError, PlannerConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::goal::{Goal, GoalId, GoalPatch};
pub use model::task::{NewTask, PositionUpdate, Task, TaskId, TaskPatch, ValidationError};
pub use planner::error::{PlannerError, PlannerResult};
pub use planner::notice::{Notice, NoticeReceiver};
pub use planner::state::TaskPhase;
pub use planner::tree::{build_task_tree, TaskNode};
pub use planner::Planner;
pub use repo::goal_repo::{GoalStore, SqliteGoalStore};
pub use repo::task_repo::{SqliteTaskStore, TaskStore};
pub use repo::{BatchItemFailure, SharedConnection, StoreError, StoreResult};
pub use service::{ServiceError, ServiceResult};
pub use session::{AuthError, OpenSessionGuard, SessionGuard, StaticTokenGuard};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
