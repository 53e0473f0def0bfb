//! Local planner state and optimistic commands.
//!
//! # Responsibility
//! - Hold the loaded week's flat task list and per-task lifecycle phase.
//! - Apply reversible edits for optimistic create, edit, delete and reorder.
//!
//! # Invariants
//! - Every edit is applied in full under one lock acquisition; readers never
//!   observe a half-applied command.
//! - A command's inverse is only applied after a confirmed remote failure.
//! - At most `TERMINAL_PHASE_CAPACITY` terminal phases are remembered; the
//!   oldest are forgotten first.

use crate::model::task::{Task, TaskId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Terminal phases kept for late readers before the oldest are dropped.
const TERMINAL_PHASE_CAPACITY: usize = 256;

/// Local state shared by the planner facade and both coordinators.
pub type SharedState = Arc<Mutex<PlannerState>>;

/// Locks shared state, recovering the data if a previous holder panicked.
pub(crate) fn lock_state(state: &SharedState) -> MutexGuard<'_, PlannerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle phase of one local task entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskPhase {
    /// Shown locally; remote insert in flight.
    Provisional,
    /// Matches a stored row.
    Confirmed,
    /// Remote insert failed; the entry was removed.
    Discarded,
    /// Changed locally at least once after confirmation.
    Edited,
    /// Removed locally; remote delete in flight.
    Removed,
    RemovedConfirmed,
    /// Remote delete failed; the entry is back at its former index.
    Restored,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Discarded | Self::RemovedConfirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::Confirmed => "confirmed",
            Self::Discarded => "discarded",
            Self::Edited => "edited",
            Self::Removed => "removed",
            Self::RemovedConfirmed => "removed_confirmed",
            Self::Restored => "restored",
        }
    }
}

/// Reversible change to the flat task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEdit {
    Append(Task),
    /// Replaces the entry with `id` in place; the replacement may carry a new id.
    Replace { id: TaskId, task: Task },
    /// Replaces every listed task, matched by id.
    ReplaceMany(Vec<Task>),
    RemoveMany(Vec<TaskId>),
    /// Re-inserts entries at their recorded indices, ascending.
    RestoreMany(Vec<(usize, Task)>),
    /// Swaps the day's top-level tasks for `tasks`; subtasks and other days
    /// are untouched.
    ReplaceDayTopLevel { day_of_week: u8, tasks: Vec<Task> },
}

/// Forward edit plus the edit that undoes it.
#[derive(Debug, Clone)]
pub struct OptimisticCommand {
    label: &'static str,
    forward: StateEdit,
    inverse: StateEdit,
    revert_on_failure: bool,
}

impl OptimisticCommand {
    pub fn new(label: &'static str, forward: StateEdit, inverse: StateEdit) -> Self {
        Self {
            label,
            forward,
            inverse,
            revert_on_failure: true,
        }
    }

    /// Command whose local effect is kept even if the remote write fails.
    pub fn without_rollback(label: &'static str, forward: StateEdit, inverse: StateEdit) -> Self {
        Self {
            revert_on_failure: false,
            ..Self::new(label, forward, inverse)
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn apply(&self, state: &mut PlannerState) {
        state.apply(self.forward.clone());
    }

    /// Consumes the command after a failed remote write. Returns whether local
    /// state was reverted.
    pub fn fail(self, state: &mut PlannerState) -> bool {
        if self.revert_on_failure {
            state.apply(self.inverse);
        }
        self.revert_on_failure
    }
}

/// The loaded week as the UI sees it.
#[derive(Debug, Default)]
pub struct PlannerState {
    week_offset: i32,
    tasks: Vec<Task>,
    phases: HashMap<TaskId, TaskPhase>,
    /// Ids in `phases` holding a terminal phase, oldest first.
    terminal: VecDeque<TaskId>,
}

impl PlannerState {
    pub fn new(week_offset: i32) -> Self {
        Self {
            week_offset,
            ..Self::default()
        }
    }

    pub fn week_offset(&self) -> i32 {
        self.week_offset
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn phase(&self, id: TaskId) -> Option<TaskPhase> {
        self.phases.get(&id).copied()
    }

    pub fn set_phase(&mut self, id: TaskId, phase: TaskPhase) {
        let previous = self.phases.insert(id, phase);
        if !phase.is_terminal() || previous.is_some_and(TaskPhase::is_terminal) {
            return;
        }
        self.terminal.push_back(id);
        while self.terminal.len() > TERMINAL_PHASE_CAPACITY {
            let Some(oldest) = self.terminal.pop_front() else {
                break;
            };
            if self.phases.get(&oldest).is_some_and(|phase| phase.is_terminal()) {
                self.phases.remove(&oldest);
            }
        }
    }

    pub fn forget_phase(&mut self, id: TaskId) {
        self.phases.remove(&id);
    }

    /// Switches to `week_offset` with a freshly fetched task list. Every
    /// loaded task starts `Confirmed`.
    pub fn replace_week(&mut self, week_offset: i32, tasks: Vec<Task>) {
        self.week_offset = week_offset;
        self.phases = tasks
            .iter()
            .map(|task| (task.id, TaskPhase::Confirmed))
            .collect();
        self.terminal.clear();
        self.tasks = tasks;
    }

    /// All tasks of one day in the loaded week, any depth.
    pub fn day_tasks(&self, day_of_week: u8) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| task.in_scope(self.week_offset, day_of_week))
            .cloned()
            .collect()
    }

    /// Top-level tasks of one day ordered by `position`, then `created_at`.
    pub fn top_level_of_day(&self, day_of_week: u8) -> Vec<Task> {
        let mut top_level = self
            .tasks
            .iter()
            .filter(|task| task.is_top_level() && task.in_scope(self.week_offset, day_of_week))
            .cloned()
            .collect::<Vec<_>>();
        top_level.sort_by_key(|task| (task.position, task.created_at));
        top_level
    }

    /// `id` followed by every local descendant, breadth first.
    pub fn subtree_ids(&self, id: TaskId) -> Vec<TaskId> {
        let mut ids = vec![id];
        let mut seen = HashSet::from([id]);
        let mut cursor = 0;
        while cursor < ids.len() {
            let parent = ids[cursor];
            for task in &self.tasks {
                if task.parent_task_id == Some(parent) && seen.insert(task.id) {
                    ids.push(task.id);
                }
            }
            cursor += 1;
        }
        ids
    }

    /// Builds the command that removes `id` and its descendants and can put
    /// them back at their current indices.
    pub fn removal_command(&self, id: TaskId) -> Option<OptimisticCommand> {
        self.task(id)?;
        let ids = self.subtree_ids(id);
        let wanted = ids.iter().copied().collect::<HashSet<_>>();
        let removed = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| wanted.contains(&task.id))
            .map(|(index, task)| (index, task.clone()))
            .collect::<Vec<_>>();
        Some(OptimisticCommand::new(
            "delete",
            StateEdit::RemoveMany(ids),
            StateEdit::RestoreMany(removed),
        ))
    }

    pub fn apply(&mut self, edit: StateEdit) {
        match edit {
            StateEdit::Append(task) => self.tasks.push(task),
            StateEdit::Replace { id, task } => {
                if let Some(slot) = self.tasks.iter_mut().find(|entry| entry.id == id) {
                    *slot = task;
                }
            }
            StateEdit::ReplaceMany(replacements) => {
                let mut by_id = replacements
                    .into_iter()
                    .map(|task| (task.id, task))
                    .collect::<HashMap<_, _>>();
                for slot in &mut self.tasks {
                    if let Some(task) = by_id.remove(&slot.id) {
                        *slot = task;
                    }
                }
            }
            StateEdit::RemoveMany(ids) => {
                let ids = ids.into_iter().collect::<HashSet<_>>();
                self.tasks.retain(|task| !ids.contains(&task.id));
            }
            StateEdit::RestoreMany(mut entries) => {
                entries.sort_by_key(|(index, _)| *index);
                for (index, task) in entries {
                    if self.task(task.id).is_some() {
                        continue;
                    }
                    let index = index.min(self.tasks.len());
                    self.tasks.insert(index, task);
                }
            }
            StateEdit::ReplaceDayTopLevel { day_of_week, tasks } => {
                let week_offset = self.week_offset;
                self.tasks.retain(|task| {
                    !(task.is_top_level() && task.in_scope(week_offset, day_of_week))
                });
                self.tasks.extend(tasks);
            }
        }
    }

    /// Merges a freshly fetched day into local state.
    ///
    /// Stored rows replace local ones, except that local top-level positions
    /// win (a debounced reorder may not have landed yet) and `Provisional`
    /// entries are kept until their own insert resolves.
    pub fn merge_fetched_day(&mut self, day_of_week: u8, fetched: Vec<Task>) {
        let week_offset = self.week_offset;
        let local_positions = self
            .tasks
            .iter()
            .filter(|task| task.is_top_level() && task.in_scope(week_offset, day_of_week))
            .map(|task| (task.id, task.position))
            .collect::<HashMap<_, _>>();
        let phases = &self.phases;
        self.tasks.retain(|task| {
            !task.in_scope(week_offset, day_of_week)
                || phases.get(&task.id) == Some(&TaskPhase::Provisional)
        });

        for mut task in fetched {
            if !task.in_scope(week_offset, day_of_week) {
                continue;
            }
            if task.is_top_level() {
                if let Some(position) = local_positions.get(&task.id) {
                    task.position = *position;
                }
            }
            self.phases.entry(task.id).or_insert(TaskPhase::Confirmed);
            self.tasks.push(task);
        }
    }

    /// Renumbers the day's top-level tasks `0..n-1` in their current order.
    /// Returns whether any position changed.
    pub fn compact_day(&mut self, day_of_week: u8) -> bool {
        let order = self
            .top_level_of_day(day_of_week)
            .into_iter()
            .enumerate()
            .map(|(index, task)| (task.id, index as i64))
            .collect::<HashMap<_, _>>();
        let mut changed = false;
        for task in &mut self.tasks {
            if let Some(position) = order.get(&task.id) {
                changed |= task.position != *position;
                task.position = *position;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::{OptimisticCommand, PlannerState, StateEdit, TaskPhase, TERMINAL_PHASE_CAPACITY};
    use crate::model::task::Task;
    use uuid::Uuid;

    fn task(day: u8, parent: Option<Uuid>, position: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            content: "t".to_string(),
            day_of_week: day,
            week_offset: 0,
            completed: false,
            parent_task_id: parent,
            position,
            created_at: position,
            updated_at: position,
        }
    }

    #[test]
    fn removal_command_restores_subtree_at_original_indices() {
        let root = task(1, None, 0);
        let child = task(1, Some(root.id), 0);
        let other = task(1, None, 1);
        let grandchild = task(1, Some(child.id), 0);
        let original = vec![root.clone(), other.clone(), child.clone(), grandchild.clone()];

        let mut state = PlannerState::new(0);
        state.replace_week(0, original.clone());

        let command = state.removal_command(root.id).expect("root exists");
        command.apply(&mut state);
        assert_eq!(state.tasks(), &[other.clone()]);

        assert!(command.fail(&mut state));
        assert_eq!(state.tasks(), original.as_slice());
    }

    #[test]
    fn command_without_rollback_keeps_forward_edit() {
        let original = task(2, None, 0);
        let mut edited = original.clone();
        edited.completed = true;

        let mut state = PlannerState::new(0);
        state.replace_week(0, vec![original.clone()]);
        let command = OptimisticCommand::without_rollback(
            "toggle",
            StateEdit::Replace {
                id: original.id,
                task: edited.clone(),
            },
            StateEdit::Replace {
                id: original.id,
                task: original,
            },
        );
        command.apply(&mut state);
        assert!(!command.fail(&mut state));
        assert_eq!(state.tasks(), &[edited]);
    }

    #[test]
    fn replacing_day_top_level_leaves_subtasks_and_other_days() {
        let a = task(3, None, 0);
        let b = task(3, None, 1);
        let sub = task(3, Some(a.id), 0);
        let elsewhere = task(4, None, 0);
        let mut state = PlannerState::new(0);
        state.replace_week(0, vec![a.clone(), b.clone(), sub.clone(), elsewhere.clone()]);

        let mut b_first = b.clone();
        b_first.position = 0;
        let mut a_second = a.clone();
        a_second.position = 1;
        state.apply(StateEdit::ReplaceDayTopLevel {
            day_of_week: 3,
            tasks: vec![b_first.clone(), a_second.clone()],
        });

        let ids = state
            .top_level_of_day(3)
            .iter()
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![b.id, a.id]);
        assert!(state.task(sub.id).is_some());
        assert_eq!(state.task(elsewhere.id), Some(&elsewhere));
    }

    #[test]
    fn merge_keeps_provisional_entries_and_local_positions() {
        let a = task(5, None, 0);
        let b = task(5, None, 1);
        let pending = task(5, None, 2);
        let mut state = PlannerState::new(0);
        state.replace_week(0, vec![a.clone(), b.clone()]);
        state.apply(StateEdit::Append(pending.clone()));
        state.set_phase(pending.id, TaskPhase::Provisional);

        let mut stored_a = a.clone();
        stored_a.position = 1;
        let mut stored_b = b.clone();
        stored_b.position = 0;
        let sub = task(5, Some(a.id), 0);
        state.merge_fetched_day(5, vec![stored_b, stored_a, sub.clone()]);

        assert_eq!(state.task(a.id).map(|t| t.position), Some(0));
        assert_eq!(state.task(b.id).map(|t| t.position), Some(1));
        assert!(state.task(pending.id).is_some());
        assert_eq!(state.phase(sub.id), Some(TaskPhase::Confirmed));
    }

    #[test]
    fn compact_day_closes_gaps() {
        let a = task(6, None, 0);
        let c = task(6, None, 2);
        let mut state = PlannerState::new(0);
        state.replace_week(0, vec![c.clone(), a.clone()]);
        assert!(state.compact_day(6));
        assert_eq!(state.task(a.id).map(|t| t.position), Some(0));
        assert_eq!(state.task(c.id).map(|t| t.position), Some(1));
        assert!(!state.compact_day(6));
    }

    #[test]
    fn oldest_terminal_phases_are_forgotten_past_capacity() {
        let mut state = PlannerState::new(0);
        let live = Uuid::new_v4();
        state.set_phase(live, TaskPhase::Confirmed);

        let gone = (0..TERMINAL_PHASE_CAPACITY + 2)
            .map(|_| Uuid::new_v4())
            .collect::<Vec<_>>();
        for id in &gone {
            state.set_phase(*id, TaskPhase::Discarded);
        }
        // Re-marking a terminal entry does not count twice.
        state.set_phase(gone[5], TaskPhase::Discarded);

        assert_eq!(state.phase(gone[0]), None);
        assert_eq!(state.phase(gone[1]), None);
        assert_eq!(state.phase(gone[2]), Some(TaskPhase::Discarded));
        assert_eq!(
            state.phase(gone[TERMINAL_PHASE_CAPACITY + 1]),
            Some(TaskPhase::Discarded)
        );
        assert_eq!(state.phase(live), Some(TaskPhase::Confirmed));
        assert_eq!(state.phases.len(), TERMINAL_PHASE_CAPACITY + 1);
    }

    #[test]
    fn terminal_phases() {
        assert!(TaskPhase::Discarded.is_terminal());
        assert!(TaskPhase::RemovedConfirmed.is_terminal());
        assert!(!TaskPhase::Restored.is_terminal());
    }
}
