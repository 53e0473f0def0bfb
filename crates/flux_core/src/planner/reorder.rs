//! Debounced, optimistic reordering of a day's top-level tasks.
//!
//! # Responsibility
//! - Apply a new top-level order locally at once with `position = index`.
//! - Coalesce bursts per `(week_offset, day_of_week)` channel and write only
//!   the last ordering after the quiet period.
//!
//! # Invariants
//! - One pending write per channel. Scheduling aborts the previous timer and
//!   bumps the channel generation, so a timer that already woke but lost the
//!   race never writes.
//! - A timer that removed itself from the pending map owns its write; the
//!   write is never cancelled once started.
//! - Transactional failures restore the order captured before the burst
//!   began; independent failures leave local order as is.
//! - A pending write always carries local top-level positions of every
//!   confirmed task of its day; inserts, discards and deletes that land
//!   during the window rebuild it.

use crate::config::BatchMode;
use crate::model::task::{validate_day_of_week, PositionUpdate, Task, ValidationError};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::notice::{Notice, Notifier};
use crate::planner::state::{lock_state, PlannerState, SharedState, StateEdit, TaskPhase};
use crate::repo::task_repo::TaskStore;
use crate::session::Session;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// `(week_offset, day_of_week)`.
type DayChannel = (i32, u8);

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
    updates: Vec<PositionUpdate>,
    /// Top-level order before the first reorder of the burst.
    baseline: Vec<Task>,
}

#[derive(Default)]
struct Channels {
    next_generation: u64,
    pending: HashMap<DayChannel, PendingWrite>,
}

struct ReorderInner {
    store: Arc<dyn TaskStore>,
    state: SharedState,
    notifier: Notifier,
    debounce: Duration,
    batch_mode: BatchMode,
    channels: Mutex<Channels>,
}

/// Schedules and writes top-level reorders.
#[derive(Clone)]
pub struct ReorderCoordinator {
    inner: Arc<ReorderInner>,
    session: Session,
}

impl ReorderCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        state: SharedState,
        notifier: Notifier,
        session: Session,
        debounce: Duration,
        batch_mode: BatchMode,
    ) -> Self {
        Self {
            inner: Arc::new(ReorderInner {
                store,
                state,
                notifier,
                debounce,
                batch_mode,
                channels: Mutex::new(Channels::default()),
            }),
            session,
        }
    }

    /// Applies `ordered` as the new top-level order of `day_of_week` in the
    /// loaded week and schedules its write.
    ///
    /// Returns the repositioned tasks. An empty ordering is ignored. Tasks of
    /// the day missing from `ordered` keep their relative order after the
    /// listed ones. Must be called from within a tokio runtime.
    pub fn reorder_tasks(&self, day_of_week: u8, ordered: &[Task]) -> PlannerResult<Vec<Task>> {
        self.session.check()?;
        validate_day_of_week(day_of_week)?;
        if ordered.is_empty() {
            debug!("event=reorder_schedule module=planner status=skipped reason=empty_ordering day={day_of_week}");
            return Ok(Vec::new());
        }
        let runtime = Handle::try_current().map_err(|_| PlannerError::RuntimeUnavailable)?;

        let (channel, baseline, repositioned, updates) = {
            let mut state = lock_state(&self.inner.state);
            let current = state.top_level_of_day(day_of_week);
            let repositioned = reposition(&current, ordered)?;
            let updates = persisted_positions(&state, &repositioned);
            state.apply(StateEdit::ReplaceDayTopLevel {
                day_of_week,
                tasks: repositioned.clone(),
            });
            ((state.week_offset(), day_of_week), current, repositioned, updates)
        };

        self.inner.schedule(&runtime, channel, updates, baseline);
        Ok(repositioned)
    }

    /// Writes every pending reorder now instead of waiting for its timer.
    pub async fn flush_pending(&self) {
        let due = {
            let mut channels = self.inner.lock_channels();
            channels.pending.drain().collect::<Vec<_>>()
        };
        for (channel, pending) in due {
            pending.handle.abort();
            self.inner
                .write(channel, pending.updates, pending.baseline)
                .await;
        }
    }

    /// Number of day channels with a write waiting for its quiet period.
    pub fn pending_channels(&self) -> usize {
        self.inner.lock_channels().pending.len()
    }

    /// Rebuilds the pending write of `day_of_week` in the loaded week from
    /// local state after an insert, discard or delete changed the day.
    ///
    /// With `schedule_if_idle`, a write of the day's local positions is
    /// scheduled when none is waiting.
    pub fn resync_pending(&self, day_of_week: u8, schedule_if_idle: bool) {
        let (channel, updates, baseline) = {
            let state = lock_state(&self.inner.state);
            let channel = (state.week_offset(), day_of_week);
            let current = state.top_level_of_day(day_of_week);
            let updates = persisted_positions(&state, &current);
            if let Some(pending) = self.inner.lock_channels().pending.get_mut(&channel) {
                pending.updates = updates;
                return;
            }
            if !schedule_if_idle || updates.is_empty() {
                return;
            }
            (channel, updates, current)
        };
        self.schedule_from_runtime(channel, updates, baseline);
    }

    /// Carries the local slot of a just-confirmed top-level task to the store.
    ///
    /// `stored` is the row the insert returned. When its position differs
    /// from the slot the task holds locally (the day was reordered while the
    /// insert was in flight), the day's pending write is rebuilt, or a new
    /// one is scheduled if none is waiting. A failed transactional write puts
    /// the task back at its stored slot.
    pub fn adopt_confirmed(&self, stored: &Task) {
        let channel = (stored.week_offset, stored.day_of_week);
        let (updates, baseline) = {
            let state = lock_state(&self.inner.state);
            if state.week_offset() != stored.week_offset {
                return;
            }
            let current = state.top_level_of_day(stored.day_of_week);
            let updates = persisted_positions(&state, &current);
            if let Some(pending) = self.inner.lock_channels().pending.get_mut(&channel) {
                pending.updates = updates;
                return;
            }
            let moved = updates
                .iter()
                .any(|update| update.id == stored.id && update.position != stored.position);
            if !moved {
                return;
            }
            let mut baseline = current;
            for task in &mut baseline {
                if task.id == stored.id {
                    task.position = stored.position;
                }
            }
            baseline.sort_by_key(|task| (task.position, task.created_at));
            (updates, baseline)
        };
        self.schedule_from_runtime(channel, updates, baseline);
    }

    fn schedule_from_runtime(
        &self,
        channel: DayChannel,
        updates: Vec<PositionUpdate>,
        baseline: Vec<Task>,
    ) {
        match Handle::try_current() {
            Ok(runtime) => self.inner.schedule(&runtime, channel, updates, baseline),
            Err(_) => warn!(
                "event=reorder_schedule module=planner status=skipped reason=no_runtime week_offset={} day={}",
                channel.0, channel.1
            ),
        }
    }
}

impl ReorderInner {
    fn lock_channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(
        self: &Arc<Self>,
        runtime: &Handle,
        channel: DayChannel,
        updates: Vec<PositionUpdate>,
        baseline: Vec<Task>,
    ) {
        let (week_offset, day_of_week) = channel;
        let item_count = updates.len();
        let mut channels = self.lock_channels();
        channels.next_generation += 1;
        let generation = channels.next_generation;

        let baseline = match channels.pending.remove(&channel) {
            Some(previous) => {
                previous.handle.abort();
                debug!(
                    "event=reorder_schedule module=planner status=superseded week_offset={week_offset} day={day_of_week} generation={}",
                    previous.generation
                );
                previous.baseline
            }
            None => baseline,
        };

        let timer = Arc::clone(self);
        let handle = runtime.spawn(async move {
            timer.fire_after_quiet_period(channel, generation).await;
        });
        channels.pending.insert(
            channel,
            PendingWrite {
                generation,
                handle,
                updates,
                baseline,
            },
        );
        info!(
            "event=reorder_schedule module=planner status=ok week_offset={week_offset} day={day_of_week} items={item_count} generation={generation} debounce_ms={}",
            self.debounce.as_millis()
        );
    }

    async fn fire_after_quiet_period(self: Arc<Self>, channel: DayChannel, generation: u64) {
        tokio::time::sleep(self.debounce).await;
        let due = {
            let mut channels = self.lock_channels();
            match channels.pending.get(&channel) {
                Some(pending) if pending.generation == generation => {
                    channels.pending.remove(&channel)
                }
                _ => None,
            }
        };
        if let Some(pending) = due {
            self.write(channel, pending.updates, pending.baseline).await;
        }
    }

    async fn write(&self, channel: DayChannel, updates: Vec<PositionUpdate>, baseline: Vec<Task>) {
        let (week_offset, day_of_week) = channel;
        if updates.is_empty() {
            return;
        }
        let started = Instant::now();
        let result = match self.batch_mode {
            BatchMode::Transactional => self.store.batch_update_positions_atomic(&updates).await,
            BatchMode::Independent => self.store.batch_update_positions(&updates).await,
        };
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(()) => {
                info!(
                    "event=reorder_flush module=planner status=ok week_offset={week_offset} day={day_of_week} items={} mode={} duration_ms={duration_ms}",
                    updates.len(),
                    self.batch_mode.as_str()
                );
                self.notifier.emit(Notice::ReorderPersisted {
                    week_offset,
                    day_of_week,
                    count: updates.len(),
                });
            }
            Err(err) => {
                let rolled_back = self.batch_mode == BatchMode::Transactional
                    && self.restore_baseline(channel, &baseline);
                error!(
                    "event=reorder_flush module=planner status=error week_offset={week_offset} day={day_of_week} items={} mode={} rolled_back={rolled_back} duration_ms={duration_ms} error={err}",
                    updates.len(),
                    self.batch_mode.as_str()
                );
                self.notifier.emit(Notice::ReorderFailed {
                    week_offset,
                    day_of_week,
                    message: err.to_string(),
                    rolled_back,
                });
            }
        }
    }

    /// Puts the pre-burst order back, unless a newer burst already owns the
    /// channel or the user switched weeks.
    fn restore_baseline(&self, channel: DayChannel, baseline: &[Task]) -> bool {
        if self.lock_channels().pending.contains_key(&channel) {
            return false;
        }
        let (week_offset, day_of_week) = channel;
        let mut state = lock_state(&self.state);
        if state.week_offset() != week_offset {
            return false;
        }
        let restored = restore_order(&state.top_level_of_day(day_of_week), baseline);
        state.apply(StateEdit::ReplaceDayTopLevel {
            day_of_week,
            tasks: restored,
        });
        true
    }
}

/// `{id, position}` pairs for the confirmed tasks of `tasks`. Provisional
/// entries have no stored row yet.
fn persisted_positions(state: &PlannerState, tasks: &[Task]) -> Vec<PositionUpdate> {
    tasks
        .iter()
        .filter(|task| state.phase(task.id) != Some(TaskPhase::Provisional))
        .map(|task| PositionUpdate {
            id: task.id,
            position: task.position,
        })
        .collect()
}

/// Orders `current` by `ordered` and assigns `position = index`.
fn reposition(current: &[Task], ordered: &[Task]) -> Result<Vec<Task>, ValidationError> {
    let by_id = current
        .iter()
        .map(|task| (task.id, task))
        .collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(current.len());
    for task in ordered {
        let local = by_id
            .get(&task.id)
            .ok_or(ValidationError::UnknownTaskInOrdering(task.id))?;
        if seen.insert(task.id) {
            result.push((*local).clone());
        }
    }
    result.extend(
        current
            .iter()
            .filter(|task| !seen.contains(&task.id))
            .cloned(),
    );
    for (index, task) in result.iter_mut().enumerate() {
        task.position = index as i64;
    }
    Ok(result)
}

/// Orders `current` by each task's rank in `baseline`. Tasks the baseline
/// never saw go last in their current order.
fn restore_order(current: &[Task], baseline: &[Task]) -> Vec<Task> {
    let rank = baseline
        .iter()
        .enumerate()
        .map(|(index, task)| (task.id, index))
        .collect::<HashMap<_, _>>();
    let mut restored = current.to_vec();
    restored.sort_by_key(|task| rank.get(&task.id).copied().unwrap_or(usize::MAX));
    for (index, task) in restored.iter_mut().enumerate() {
        task.position = index as i64;
    }
    restored
}

#[cfg(test)]
mod tests {
    use super::{reposition, restore_order};
    use crate::model::task::{Task, ValidationError};
    use uuid::Uuid;

    fn top(position: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            content: "t".to_string(),
            day_of_week: 0,
            week_offset: 0,
            completed: false,
            parent_task_id: None,
            position,
            created_at: position,
            updated_at: position,
        }
    }

    #[test]
    fn reposition_assigns_index_positions_in_submitted_order() {
        let (a, b, c) = (top(0), top(1), top(2));
        let current = vec![a.clone(), b.clone(), c.clone()];
        let result = reposition(&current, &[c.clone(), a.clone(), b.clone()]).expect("valid");
        let pairs = result
            .iter()
            .map(|task| (task.id, task.position))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(c.id, 0), (a.id, 1), (b.id, 2)]);
    }

    #[test]
    fn reposition_rejects_unknown_ids_and_keeps_unlisted_tasks() {
        let (a, b) = (top(0), top(1));
        let stranger = top(9);
        let err = reposition(&[a.clone(), b.clone()], &[stranger.clone()]).unwrap_err();
        assert_eq!(err, ValidationError::UnknownTaskInOrdering(stranger.id));

        let result = reposition(&[a.clone(), b.clone()], &[b.clone()]).expect("partial list");
        assert_eq!(result[0].id, b.id);
        assert_eq!(result[1].id, a.id);
        assert_eq!(result[1].position, 1);
    }

    #[test]
    fn restore_order_follows_baseline_and_skips_deleted_tasks() {
        let (a, b, c) = (top(0), top(1), top(2));
        let baseline = vec![a.clone(), b.clone(), c.clone()];
        let mut moved_c = c.clone();
        moved_c.position = 0;
        let mut moved_a = a.clone();
        moved_a.position = 1;
        let added = top(5);

        // b was deleted during the burst; `added` arrived afterwards.
        let restored = restore_order(&[moved_c, moved_a, added.clone()], &baseline);
        let ids = restored.iter().map(|task| task.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![a.id, c.id, added.id]);
        assert_eq!(restored[2].position, 2);
    }
}
