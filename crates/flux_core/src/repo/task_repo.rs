//! Weekly task store contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the async persistence interface the planner coordinators consume.
//! - Allocate top-level positions atomically with the insert.
//! - Cascade deletes to all descendant subtasks.
//!
//! # Invariants
//! - `list_tasks` order is deterministic:
//!   `day_of_week ASC, position ASC, created_at ASC, rowid ASC`.
//! - Top-level positions of one `(week_offset, day_of_week)` scope stay
//!   contiguous from 0 after insert, delete and transactional batch writes.
//! - Independent batch writes are not atomic; failed items are reported in
//!   `StoreError::PartialBatch` and every other item stays applied.

use crate::model::now_epoch_ms;
use crate::model::task::{
    NewTask, PositionUpdate, Task, TaskId, TaskPatch, ValidationError,
    SUBTASK_PLACEHOLDER_POSITION,
};
use crate::planner::position::next_position;
use crate::repo::{
    bool_to_int, parse_bool, parse_uuid, share_connection, BatchItemFailure, SharedConnection,
    StoreError, StoreResult,
};
use async_trait::async_trait;
use log::{error, info, warn};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    content,
    day_of_week,
    week_offset,
    completed,
    parent_task_id,
    position,
    created_at,
    updated_at
FROM weekly_tasks";

/// Persistence interface for weekly tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Lists every task of one week, all days, all depths.
    async fn list_tasks(&self, week_offset: i32) -> StoreResult<Vec<Task>>;
    /// Loads one task by id.
    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;
    /// Inserts one task; the store assigns id, timestamps and position.
    async fn insert_task(&self, new_task: &NewTask) -> StoreResult<Task>;
    /// Applies a field-level patch and returns the canonical row.
    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task>;
    /// Applies each `{id, position}` pair independently.
    async fn batch_update_positions(&self, updates: &[PositionUpdate]) -> StoreResult<()>;
    /// Applies all `{id, position}` pairs in one transaction, or none.
    async fn batch_update_positions_atomic(&self, updates: &[PositionUpdate])
        -> StoreResult<()>;
    /// Deletes one task and every descendant subtask.
    async fn delete_task(&self, id: TaskId) -> StoreResult<()>;
}

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: SharedConnection,
}

impl SqliteTaskStore {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        Ok(Self {
            conn: share_connection(conn)?,
        })
    }

    /// Creates a store over a connection already shared with other stores.
    pub fn with_shared(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Returns the underlying shared connection.
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn list_tasks(&self, week_offset: i32) -> StoreResult<Vec<Task>> {
        let conn = self.conn.lock().await;
        list_week(&conn, week_offset)
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let conn = self.conn.lock().await;
        load_task(&conn, id)
    }

    async fn insert_task(&self, new_task: &NewTask) -> StoreResult<Task> {
        new_task.validate()?;
        let started_at = Instant::now();
        let mut conn = self.conn.lock().await;
        match insert_task_tx(&mut conn, new_task) {
            Ok(task) => {
                info!(
                    "event=task_insert module=repo status=ok task_id={} week_offset={} day_of_week={} position={} subtask={} duration_ms={}",
                    task.id,
                    task.week_offset,
                    task.day_of_week,
                    task.position,
                    !task.is_top_level(),
                    started_at.elapsed().as_millis()
                );
                Ok(task)
            }
            Err(err) => {
                error!("event=task_insert module=repo status=error error={err}");
                Err(err)
            }
        }
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        patch.validate()?;
        let mut conn = self.conn.lock().await;
        match update_task_tx(&mut conn, id, patch) {
            Ok(task) => {
                info!(
                    "event=task_update module=repo status=ok task_id={id} completed={} day_of_week={} week_offset={}",
                    task.completed, task.day_of_week, task.week_offset
                );
                Ok(task)
            }
            Err(err) => {
                error!("event=task_update module=repo status=error task_id={id} error={err}");
                Err(err)
            }
        }
    }

    async fn batch_update_positions(&self, updates: &[PositionUpdate]) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let result = update_positions_independently(&conn, updates);
        match &result {
            Ok(()) => info!(
                "event=task_batch_positions module=repo status=ok mode=independent count={}",
                updates.len()
            ),
            Err(StoreError::PartialBatch(failures)) => warn!(
                "event=task_batch_positions module=repo status=error mode=independent count={} failed={}",
                updates.len(),
                failures.len()
            ),
            Err(err) => error!(
                "event=task_batch_positions module=repo status=error mode=independent error={err}"
            ),
        }
        result
    }

    async fn batch_update_positions_atomic(
        &self,
        updates: &[PositionUpdate],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let result = update_positions_atomically(&mut conn, updates);
        match &result {
            Ok(()) => info!(
                "event=task_batch_positions module=repo status=ok mode=transactional count={}",
                updates.len()
            ),
            Err(err) => error!(
                "event=task_batch_positions module=repo status=error mode=transactional count={} error={err}",
                updates.len()
            ),
        }
        result
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        match delete_task_tx(&mut conn, id) {
            Ok(removed) => {
                info!("event=task_delete module=repo status=ok task_id={id} removed={removed}");
                Ok(())
            }
            Err(err) => {
                error!("event=task_delete module=repo status=error task_id={id} error={err}");
                Err(err)
            }
        }
    }
}

fn list_week(conn: &Connection, week_offset: i32) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL}
         WHERE week_offset = ?1
         ORDER BY day_of_week ASC, position ASC, created_at ASC, rowid ASC;"
    ))?;
    let mut rows = stmt.query([week_offset])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn load_task(conn: &Connection, id: TaskId) -> StoreResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

fn insert_task_tx(conn: &mut Connection, new_task: &NewTask) -> StoreResult<Task> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (day_of_week, week_offset, position) = match new_task.parent_task_id {
        Some(parent_id) => {
            let parent = load_task(&tx, parent_id)?.ok_or(StoreError::NotFound(parent_id))?;
            (
                parent.day_of_week,
                parent.week_offset,
                SUBTASK_PLACEHOLDER_POSITION,
            )
        }
        None => {
            let max = max_top_level_position(&tx, new_task.week_offset, new_task.day_of_week)?;
            (
                new_task.day_of_week,
                new_task.week_offset,
                next_position(max),
            )
        }
    };

    let id = Uuid::new_v4();
    let now = now_epoch_ms();
    tx.execute(
        "INSERT INTO weekly_tasks (
            id,
            content,
            day_of_week,
            week_offset,
            completed,
            parent_task_id,
            position,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7);",
        params![
            id.to_string(),
            new_task.content.trim(),
            day_of_week,
            week_offset,
            new_task.parent_task_id.map(|value| value.to_string()),
            position,
            now,
        ],
    )?;

    let task = load_task(&tx, id)?.ok_or_else(|| {
        StoreError::InvalidData(format!("inserted task {id} missing in read-back"))
    })?;
    tx.commit()?;
    Ok(task)
}

fn update_task_tx(conn: &mut Connection, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut task = load_task(&tx, id)?.ok_or(StoreError::NotFound(id))?;

    let scope_before = (task.week_offset, task.day_of_week);
    task.apply_patch(patch);
    let scope_changed = (task.week_offset, task.day_of_week) != scope_before;
    if scope_changed && !task.is_top_level() {
        return Err(ValidationError::SubtaskScopeChange.into());
    }
    task.updated_at = now_epoch_ms().max(task.updated_at);

    tx.execute(
        "UPDATE weekly_tasks
         SET
            content = ?2,
            completed = ?3,
            day_of_week = ?4,
            week_offset = ?5,
            position = ?6,
            updated_at = ?7
         WHERE id = ?1;",
        params![
            id.to_string(),
            task.content.as_str(),
            bool_to_int(task.completed),
            task.day_of_week,
            task.week_offset,
            task.position,
            task.updated_at,
        ],
    )?;

    // Subtasks follow their root into the new scope. The root keeps its old
    // position value; it is not reallocated.
    if scope_changed {
        tx.execute(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM weekly_tasks WHERE parent_task_id = ?1
                UNION ALL
                SELECT child.id
                FROM weekly_tasks child
                INNER JOIN subtree parent ON child.parent_task_id = parent.id
            )
            UPDATE weekly_tasks
            SET day_of_week = ?2,
                week_offset = ?3,
                updated_at = ?4
            WHERE id IN (SELECT id FROM subtree);",
            params![
                id.to_string(),
                task.day_of_week,
                task.week_offset,
                task.updated_at,
            ],
        )?;
    }

    tx.commit()?;
    Ok(task)
}

fn update_positions_independently(
    conn: &Connection,
    updates: &[PositionUpdate],
) -> StoreResult<()> {
    let now = now_epoch_ms();
    let mut failures = Vec::new();

    for update in updates {
        if update.position < 0 {
            failures.push(BatchItemFailure {
                id: update.id,
                message: ValidationError::NegativePosition(update.position).to_string(),
            });
            continue;
        }
        match write_position(conn, update, now) {
            Ok(0) => failures.push(BatchItemFailure {
                id: update.id,
                message: "task not found".to_string(),
            }),
            Ok(_) => {}
            Err(err) => failures.push(BatchItemFailure {
                id: update.id,
                message: err.to_string(),
            }),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(StoreError::PartialBatch(failures))
    }
}

fn update_positions_atomically(
    conn: &mut Connection,
    updates: &[PositionUpdate],
) -> StoreResult<()> {
    let now = now_epoch_ms();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for update in updates {
        if update.position < 0 {
            return Err(ValidationError::NegativePosition(update.position).into());
        }
        if write_position(&tx, update, now)? == 0 {
            return Err(StoreError::NotFound(update.id));
        }
    }
    tx.commit()?;
    Ok(())
}

fn write_position(conn: &Connection, update: &PositionUpdate, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE weekly_tasks
         SET position = ?2,
             updated_at = ?3
         WHERE id = ?1;",
        params![update.id.to_string(), update.position, now],
    )
}

fn delete_task_tx(conn: &mut Connection, id: TaskId) -> StoreResult<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let task = load_task(&tx, id)?.ok_or(StoreError::NotFound(id))?;

    let subtree_size: i64 = tx.query_row(
        "WITH RECURSIVE subtree(id) AS (
            SELECT id FROM weekly_tasks WHERE id = ?1
            UNION ALL
            SELECT child.id
            FROM weekly_tasks child
            INNER JOIN subtree parent ON child.parent_task_id = parent.id
        )
        SELECT COUNT(*) FROM subtree;",
        [id.to_string()],
        |row| row.get(0),
    )?;

    // Descendants go through `ON DELETE CASCADE`.
    tx.execute("DELETE FROM weekly_tasks WHERE id = ?1;", [id.to_string()])?;

    if task.is_top_level() {
        compact_top_level_positions(&tx, task.week_offset, task.day_of_week)?;
    }

    tx.commit()?;
    Ok(subtree_size as usize)
}

fn compact_top_level_positions(
    conn: &Connection,
    week_offset: i32,
    day_of_week: u8,
) -> StoreResult<()> {
    let current = {
        let mut stmt = conn.prepare(
            "SELECT id, position
             FROM weekly_tasks
             WHERE week_offset = ?1
               AND day_of_week = ?2
               AND parent_task_id IS NULL
             ORDER BY position ASC, created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query(params![week_offset, day_of_week])?;
        let mut current = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let position: i64 = row.get(1)?;
            current.push((id, position));
        }
        current
    };

    for (index, (id, position)) in current.into_iter().enumerate() {
        let target = index as i64;
        if position != target {
            conn.execute(
                "UPDATE weekly_tasks SET position = ?2 WHERE id = ?1;",
                params![id, target],
            )?;
        }
    }
    Ok(())
}

fn max_top_level_position(
    conn: &Connection,
    week_offset: i32,
    day_of_week: u8,
) -> StoreResult<Option<i64>> {
    let max = conn.query_row(
        "SELECT MAX(position)
         FROM weekly_tasks
         WHERE week_offset = ?1
           AND day_of_week = ?2
           AND parent_task_id IS NULL;",
        params![week_offset, day_of_week],
        |row| row.get::<_, Option<i64>>(0),
    )?;
    Ok(max)
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let id_text: String = row.get("id")?;
    let parent_task_id = row
        .get::<_, Option<String>>("parent_task_id")?
        .map(|value| parse_uuid(&value, "weekly_tasks.parent_task_id"))
        .transpose()?;

    let day_value: i64 = row.get("day_of_week")?;
    let day_of_week = u8::try_from(day_value)
        .ok()
        .filter(|day| *day <= crate::model::task::MAX_DAY_OF_WEEK)
        .ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid day_of_week `{day_value}` in weekly_tasks.day_of_week"
            ))
        })?;

    Ok(Task {
        id: parse_uuid(&id_text, "weekly_tasks.id")?,
        content: row.get("content")?,
        day_of_week,
        week_offset: row.get("week_offset")?,
        completed: parse_bool(row.get("completed")?, "weekly_tasks.completed")?,
        parent_task_id,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
