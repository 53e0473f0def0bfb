//! Weekly planner: local state plus optimistic coordinators.
//!
//! # Responsibility
//! - Own the loaded week's local task state.
//! - Route UI commands to the mutation and reorder coordinators.
//! - Render day forests for display.
//!
//! # Invariants
//! - Reads never wait on the store; they see optimistic state immediately.
//! - Every command checks the session before touching state.

pub mod error;
pub mod mutation;
pub mod notice;
pub mod position;
pub mod reorder;
pub mod state;
pub mod tree;

use crate::config::PlannerConfig;
use crate::model::task::{validate_day_of_week, Task, TaskId};
use crate::repo::task_repo::TaskStore;
use crate::session::{Session, SessionGuard};
use crate::week::DAYS_PER_WEEK;
use error::PlannerResult;
use log::info;
use mutation::MutationCoordinator;
use notice::{NoticeReceiver, Notifier};
use reorder::ReorderCoordinator;
use state::{lock_state, PlannerState, SharedState, TaskPhase};
use std::sync::{Arc, Mutex};
use tree::{build_task_tree, TaskNode};

/// Facade the UI layer talks to.
pub struct Planner {
    store: Arc<dyn TaskStore>,
    state: SharedState,
    session: Session,
    mutations: MutationCoordinator,
    reorders: ReorderCoordinator,
}

impl Planner {
    /// Creates a planner on week 0 with empty local state. Call
    /// [`Planner::load_week`] to populate it.
    pub fn new(
        store: Arc<dyn TaskStore>,
        guard: Arc<dyn SessionGuard>,
        config: &PlannerConfig,
    ) -> (Self, NoticeReceiver) {
        let state: SharedState = Arc::new(Mutex::new(PlannerState::new(0)));
        let session = Session::new(guard);
        let (notifier, notices) = Notifier::channel();
        let reorders = ReorderCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&state),
            notifier.clone(),
            session.clone(),
            config.reorder_debounce,
            config.batch_mode,
        );
        let mutations = MutationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&state),
            notifier,
            session.clone(),
            reorders.clone(),
        );
        (
            Self {
                store,
                state,
                session,
                mutations,
                reorders,
            },
            notices,
        )
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        self.session.sign_in(token);
    }

    pub fn sign_out(&self) {
        self.session.sign_out();
    }

    /// Fetches `week_offset` from the store and makes it the loaded week.
    /// Pending reorders of the previous week are written first.
    pub async fn load_week(&self, week_offset: i32) -> PlannerResult<()> {
        self.session.check()?;
        self.reorders.flush_pending().await;
        let tasks = self.store.list_tasks(week_offset).await?;
        let count = tasks.len();
        lock_state(&self.state).replace_week(week_offset, tasks);
        info!("event=planner_load module=planner status=ok week_offset={week_offset} tasks={count}");
        Ok(())
    }

    pub fn week_offset(&self) -> i32 {
        lock_state(&self.state).week_offset()
    }

    /// Snapshot of every local task of the loaded week.
    pub fn tasks(&self) -> Vec<Task> {
        lock_state(&self.state).tasks().to_vec()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        lock_state(&self.state).task(id).cloned()
    }

    pub fn phase(&self, id: TaskId) -> Option<TaskPhase> {
        lock_state(&self.state).phase(id)
    }

    /// Forest of one day in the loaded week.
    pub fn day_tree(&self, day_of_week: u8) -> PlannerResult<Vec<TaskNode>> {
        validate_day_of_week(day_of_week)?;
        let day_tasks = lock_state(&self.state).day_tasks(day_of_week);
        Ok(build_task_tree(&day_tasks))
    }

    /// Seven forests, Sunday first.
    pub fn week_tree(&self) -> Vec<Vec<TaskNode>> {
        let state = lock_state(&self.state);
        (0..DAYS_PER_WEEK as u8)
            .map(|day| build_task_tree(&state.day_tasks(day)))
            .collect()
    }

    pub async fn add_task(&self, content: &str, day_of_week: u8) -> PlannerResult<Task> {
        self.mutations.add_task(content, day_of_week).await
    }

    pub async fn add_subtask(&self, parent_id: TaskId, content: &str) -> PlannerResult<Task> {
        self.mutations.add_subtask(parent_id, content).await
    }

    pub async fn toggle_task(&self, id: TaskId, completed: bool) -> PlannerResult<Task> {
        self.mutations.toggle_task(id, completed).await
    }

    pub async fn edit_task(&self, id: TaskId, content: &str) -> PlannerResult<Task> {
        self.mutations.edit_task(id, content).await
    }

    pub async fn move_task_to_day(&self, id: TaskId, day_of_week: u8) -> PlannerResult<Task> {
        self.mutations.move_task_to_day(id, day_of_week).await
    }

    /// Deletes `id` with its subtasks. Returns every removed id.
    pub async fn delete_task(&self, id: TaskId) -> PlannerResult<Vec<TaskId>> {
        self.mutations.delete_task(id).await
    }

    /// Applies a new top-level order for one day and schedules its write.
    pub fn reorder_tasks(&self, day_of_week: u8, ordered: &[Task]) -> PlannerResult<Vec<Task>> {
        self.reorders.reorder_tasks(day_of_week, ordered)
    }

    /// Writes pending reorders immediately.
    pub async fn flush_reorders(&self) {
        self.reorders.flush_pending().await;
    }

    pub fn pending_reorders(&self) -> usize {
        self.reorders.pending_channels()
    }
}
