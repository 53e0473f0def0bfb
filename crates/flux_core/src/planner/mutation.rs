//! Optimistic create, edit and delete.
//!
//! # Responsibility
//! - Apply each command locally before the remote write starts.
//! - Resolve the command on completion: keep and canonicalize on success,
//!   undo or report on failure.
//!
//! # Invariants
//! - Session and input checks run before the local edit; a rejected call
//!   leaves state untouched.
//! - The state lock is never held across a store call.
//! - Create and delete failures revert; edit failures only notify.
//! - A confirmed top-level create keeps the slot it holds locally, which a
//!   reorder may have changed while the insert was in flight.

use crate::model::now_epoch_ms;
use crate::model::task::{
    validate_day_of_week, NewTask, Task, TaskId, TaskPatch, ValidationError,
    SUBTASK_PLACEHOLDER_POSITION,
};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::notice::{Notice, Notifier};
use crate::planner::position::next_position;
use crate::planner::reorder::ReorderCoordinator;
use crate::planner::state::{
    lock_state, OptimisticCommand, PlannerState, SharedState, StateEdit, TaskPhase,
};
use crate::repo::task_repo::TaskStore;
use crate::repo::StoreError;
use crate::session::Session;
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Runs optimistic task mutations against local state and the store.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: Arc<dyn TaskStore>,
    state: SharedState,
    notifier: Notifier,
    session: Session,
    reorders: ReorderCoordinator,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        state: SharedState,
        notifier: Notifier,
        session: Session,
        reorders: ReorderCoordinator,
    ) -> Self {
        Self {
            store,
            state,
            notifier,
            session,
            reorders,
        }
    }

    /// Creates a top-level task at the end of `day_of_week` in the loaded
    /// week.
    pub async fn add_task(&self, content: &str, day_of_week: u8) -> PlannerResult<Task> {
        self.session.check()?;
        let week_offset = lock_state(&self.state).week_offset();
        let new_task = NewTask::top_level(content.trim(), day_of_week, week_offset);
        new_task.validate()?;

        let (provisional, command) = {
            let mut state = lock_state(&self.state);
            let max = state
                .top_level_of_day(day_of_week)
                .iter()
                .map(|task| task.position)
                .max();
            let provisional = provisional_task(&new_task, next_position(max));
            let command = self.begin_create(&mut state, &provisional);
            (provisional, command)
        };

        match self.store.insert_task(&new_task).await {
            Ok(stored) => {
                let task = {
                    let mut state = lock_state(&self.state);
                    let mut task = stored.clone();
                    if let Some(local) = state.task(provisional.id) {
                        task.position = local.position;
                    }
                    state.apply(StateEdit::Replace {
                        id: provisional.id,
                        task: task.clone(),
                    });
                    state.forget_phase(provisional.id);
                    state.set_phase(task.id, TaskPhase::Confirmed);
                    task
                };
                self.reorders.adopt_confirmed(&stored);
                info!(
                    "event=mutation_create module=planner status=ok task_id={} day={day_of_week} position={} stored_position={}",
                    task.id, task.position, stored.position
                );
                Ok(task)
            }
            Err(err) => Err(self.discard_create(command, &provisional, err)),
        }
    }

    /// Creates a subtask under `parent_id`, then refreshes the parent's day
    /// from the store.
    pub async fn add_subtask(&self, parent_id: TaskId, content: &str) -> PlannerResult<Task> {
        self.session.check()?;
        let new_task = {
            let state = lock_state(&self.state);
            let parent = state
                .task(parent_id)
                .filter(|_| state.phase(parent_id) != Some(TaskPhase::Provisional))
                .ok_or(PlannerError::NotFound(parent_id))?;
            NewTask::subtask(parent, content.trim())
        };
        new_task.validate()?;

        let provisional = provisional_task(&new_task, SUBTASK_PLACEHOLDER_POSITION);
        let command = self.begin_create(&mut lock_state(&self.state), &provisional);

        let task = match self.store.insert_task(&new_task).await {
            Ok(task) => task,
            Err(err) => return Err(self.discard_create(command, &provisional, err)),
        };

        let refreshed = self.store.list_tasks(new_task.week_offset).await;
        let mut state = lock_state(&self.state);
        state.forget_phase(provisional.id);
        match refreshed {
            Ok(tasks) if state.week_offset() == new_task.week_offset => {
                state.apply(StateEdit::RemoveMany(vec![provisional.id]));
                state.merge_fetched_day(new_task.day_of_week, tasks);
            }
            Ok(_) => state.apply(StateEdit::RemoveMany(vec![provisional.id])),
            Err(err) => {
                warn!(
                    "event=mutation_refetch module=planner status=error week_offset={} error={err}",
                    new_task.week_offset
                );
                state.apply(StateEdit::Replace {
                    id: provisional.id,
                    task: task.clone(),
                });
            }
        }
        state.set_phase(task.id, TaskPhase::Confirmed);
        info!(
            "event=mutation_create module=planner status=ok task_id={} parent_id={parent_id}",
            task.id
        );
        Ok(task)
    }

    pub async fn toggle_task(&self, id: TaskId, completed: bool) -> PlannerResult<Task> {
        self.patch_task(id, TaskPatch::completed(completed)).await
    }

    pub async fn edit_task(&self, id: TaskId, content: &str) -> PlannerResult<Task> {
        self.patch_task(id, TaskPatch::content(content.trim())).await
    }

    /// Moves a top-level task and its subtasks to another day of the same
    /// week. The position is kept as is.
    pub async fn move_task_to_day(&self, id: TaskId, day_of_week: u8) -> PlannerResult<Task> {
        validate_day_of_week(day_of_week)?;
        self.patch_task(id, TaskPatch::day_of_week(day_of_week))
            .await
    }

    /// Applies `patch` locally, then remotely. A remote failure is reported
    /// and the local edit stays.
    pub async fn patch_task(&self, id: TaskId, patch: TaskPatch) -> PlannerResult<Task> {
        self.session.check()?;
        patch.validate()?;

        let command = {
            let mut state = lock_state(&self.state);
            let original = state
                .task(id)
                .filter(|_| state.phase(id) != Some(TaskPhase::Provisional))
                .cloned()
                .ok_or(PlannerError::NotFound(id))?;
            let moves_scope = patch
                .day_of_week
                .is_some_and(|day| day != original.day_of_week)
                || patch
                    .week_offset
                    .is_some_and(|week| week != original.week_offset);
            if moves_scope && !original.is_top_level() {
                return Err(ValidationError::SubtaskScopeChange.into());
            }

            let mut before = vec![original.clone()];
            let mut patched = original.clone();
            patched.apply_patch(&patch);
            let mut after = vec![patched];
            if moves_scope {
                for descendant_id in state.subtree_ids(id).into_iter().skip(1) {
                    if let Some(descendant) = state.task(descendant_id) {
                        let mut moved = descendant.clone();
                        moved.day_of_week = patch.day_of_week.unwrap_or(moved.day_of_week);
                        moved.week_offset = patch.week_offset.unwrap_or(moved.week_offset);
                        before.push(descendant.clone());
                        after.push(moved);
                    }
                }
            }

            let command = OptimisticCommand::without_rollback(
                "edit",
                StateEdit::ReplaceMany(after),
                StateEdit::ReplaceMany(before),
            );
            command.apply(&mut state);
            state.set_phase(id, TaskPhase::Edited);
            command
        };

        match self.store.update_task(id, &patch).await {
            Ok(task) => {
                lock_state(&self.state).apply(StateEdit::Replace {
                    id,
                    task: task.clone(),
                });
                info!(
                    "event=mutation_update module=planner status=ok task_id={id} completed={} day={}",
                    task.completed, task.day_of_week
                );
                Ok(task)
            }
            Err(err) => {
                let label = command.label();
                let reverted = command.fail(&mut lock_state(&self.state));
                error!(
                    "event=mutation_update module=planner status=error command={label} task_id={id} reverted={reverted} error={err}"
                );
                self.notifier.emit(Notice::UpdateFailed {
                    id,
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    /// Removes `id` and its local descendants, then deletes remotely.
    ///
    /// Returns every removed id. A store `NotFound` counts as already
    /// deleted; any other failure restores the entries.
    pub async fn delete_task(&self, id: TaskId) -> PlannerResult<Vec<TaskId>> {
        self.session.check()?;

        let (command, removed_ids, top_level_day) = {
            let mut state = lock_state(&self.state);
            if state.phase(id) == Some(TaskPhase::Provisional) {
                return Err(PlannerError::NotFound(id));
            }
            let command = state
                .removal_command(id)
                .ok_or(PlannerError::NotFound(id))?;
            let removed_ids = state.subtree_ids(id);
            let top_level_day = state
                .task(id)
                .filter(|task| task.is_top_level())
                .map(|task| task.day_of_week);
            command.apply(&mut state);
            for removed in &removed_ids {
                state.set_phase(*removed, TaskPhase::Removed);
            }
            (command, removed_ids, top_level_day)
        };
        self.notifier.emit(Notice::TaskRemoved { id });

        let result = match self.store.delete_task(id).await {
            Err(StoreError::NotFound(_)) => {
                warn!("event=mutation_delete module=planner status=ok task_id={id} reason=already_absent");
                Ok(())
            }
            other => other,
        };

        let mut state = lock_state(&self.state);
        match result {
            Ok(()) => {
                for removed in &removed_ids {
                    state.set_phase(*removed, TaskPhase::RemovedConfirmed);
                }
                if let Some(day) = top_level_day {
                    state.compact_day(day);
                    drop(state);
                    self.reorders.resync_pending(day, false);
                }
                info!(
                    "event=mutation_delete module=planner status=ok task_id={id} removed={}",
                    removed_ids.len()
                );
                Ok(removed_ids)
            }
            Err(err) => {
                let label = command.label();
                command.fail(&mut state);
                for removed in &removed_ids {
                    state.set_phase(*removed, TaskPhase::Restored);
                }
                drop(state);
                error!("event=mutation_delete module=planner status=error command={label} task_id={id} error={err}");
                self.notifier.emit(Notice::DeleteFailed {
                    id,
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    fn begin_create(&self, state: &mut PlannerState, provisional: &Task) -> OptimisticCommand {
        let command = OptimisticCommand::new(
            "create",
            StateEdit::Append(provisional.clone()),
            StateEdit::RemoveMany(vec![provisional.id]),
        );
        command.apply(state);
        state.set_phase(provisional.id, TaskPhase::Provisional);
        command
    }

    /// Drops a provisional entry after its insert failed. A top-level entry
    /// may have been reordered into the middle of its day, so the day is
    /// renumbered to close the gap.
    fn discard_create(
        &self,
        command: OptimisticCommand,
        provisional: &Task,
        err: StoreError,
    ) -> PlannerError {
        let provisional_id = provisional.id;
        let label = command.label();
        let (in_loaded_day, renumbered) = {
            let mut state = lock_state(&self.state);
            command.fail(&mut state);
            state.set_phase(provisional_id, TaskPhase::Discarded);
            let in_loaded_day =
                provisional.is_top_level() && state.week_offset() == provisional.week_offset;
            let renumbered = in_loaded_day && state.compact_day(provisional.day_of_week);
            (in_loaded_day, renumbered)
        };
        if in_loaded_day {
            self.reorders
                .resync_pending(provisional.day_of_week, renumbered);
        }
        error!(
            "event=mutation_create module=planner status=error command={label} provisional_id={provisional_id} error={err}"
        );
        self.notifier.emit(Notice::CreateFailed {
            provisional_id,
            message: err.to_string(),
        });
        err.into()
    }
}

/// Local stand-in shown while the insert is in flight.
fn provisional_task(new_task: &NewTask, position: i64) -> Task {
    let now = now_epoch_ms();
    Task {
        id: Uuid::new_v4(),
        content: new_task.content.clone(),
        day_of_week: new_task.day_of_week,
        week_offset: new_task.week_offset,
        completed: false,
        parent_task_id: new_task.parent_task_id,
        position,
        created_at: now,
        updated_at: now,
    }
}
