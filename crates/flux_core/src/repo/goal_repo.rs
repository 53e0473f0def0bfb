//! Goal store contract and SQLite implementation.
//!
//! # Invariants
//! - Goal positions are unique and contiguous from 0 across the collection.
//! - Insert appends; delete compacts; a position patch moves the goal and
//!   reindexes every other goal.

use crate::model::goal::{Goal, GoalId, GoalPatch};
use crate::model::now_epoch_ms;
use crate::model::task::validate_content;
use crate::planner::position::next_position;
use crate::repo::{
    bool_to_int, parse_bool, parse_uuid, share_connection, SharedConnection, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use log::{error, info};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use uuid::Uuid;

const GOAL_SELECT_SQL: &str = "SELECT
    id,
    content,
    completed,
    position,
    created_at,
    updated_at
FROM goals";

/// Persistence interface for goals.
#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn list_goals(&self) -> StoreResult<Vec<Goal>>;
    async fn insert_goal(&self, content: &str) -> StoreResult<Goal>;
    async fn update_goal(&self, id: GoalId, patch: &GoalPatch) -> StoreResult<Goal>;
    async fn delete_goal(&self, id: GoalId) -> StoreResult<()>;
}

/// SQLite-backed goal store.
pub struct SqliteGoalStore {
    conn: SharedConnection,
}

impl SqliteGoalStore {
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        Ok(Self {
            conn: share_connection(conn)?,
        })
    }

    pub fn with_shared(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl GoalStore for SqliteGoalStore {
    async fn list_goals(&self) -> StoreResult<Vec<Goal>> {
        let conn = self.conn.lock().await;
        list_all(&conn)
    }

    async fn insert_goal(&self, content: &str) -> StoreResult<Goal> {
        validate_content(content)?;
        let mut conn = self.conn.lock().await;
        let result = insert_goal_tx(&mut conn, content.trim());
        match &result {
            Ok(goal) => info!(
                "event=goal_insert module=repo status=ok goal_id={} position={}",
                goal.id, goal.position
            ),
            Err(err) => error!("event=goal_insert module=repo status=error error={err}"),
        }
        result
    }

    async fn update_goal(&self, id: GoalId, patch: &GoalPatch) -> StoreResult<Goal> {
        patch.validate()?;
        let mut conn = self.conn.lock().await;
        let result = update_goal_tx(&mut conn, id, patch);
        match &result {
            Ok(goal) => info!(
                "event=goal_update module=repo status=ok goal_id={id} completed={} position={}",
                goal.completed, goal.position
            ),
            Err(err) => error!("event=goal_update module=repo status=error goal_id={id} error={err}"),
        }
        result
    }

    async fn delete_goal(&self, id: GoalId) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let result = delete_goal_tx(&mut conn, id);
        match &result {
            Ok(()) => info!("event=goal_delete module=repo status=ok goal_id={id}"),
            Err(err) => error!("event=goal_delete module=repo status=error goal_id={id} error={err}"),
        }
        result
    }
}

fn list_all(conn: &Connection) -> StoreResult<Vec<Goal>> {
    let mut stmt = conn.prepare(&format!(
        "{GOAL_SELECT_SQL} ORDER BY position ASC, created_at ASC, rowid ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut goals = Vec::new();
    while let Some(row) = rows.next()? {
        goals.push(parse_goal_row(row)?);
    }
    Ok(goals)
}

fn load_goal(conn: &Connection, id: GoalId) -> StoreResult<Option<Goal>> {
    let mut stmt = conn.prepare(&format!("{GOAL_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_goal_row(row)?));
    }
    Ok(None)
}

fn insert_goal_tx(conn: &mut Connection, content: &str) -> StoreResult<Goal> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let max: Option<i64> = tx.query_row("SELECT MAX(position) FROM goals;", [], |row| row.get(0))?;
    let id = Uuid::new_v4();
    let now = now_epoch_ms();
    tx.execute(
        "INSERT INTO goals (id, content, completed, position, created_at, updated_at)
         VALUES (?1, ?2, 0, ?3, ?4, ?4);",
        params![id.to_string(), content, next_position(max), now],
    )?;
    let goal = load_goal(&tx, id)?.ok_or_else(|| {
        StoreError::InvalidData(format!("inserted goal {id} missing in read-back"))
    })?;
    tx.commit()?;
    Ok(goal)
}

fn update_goal_tx(conn: &mut Connection, id: GoalId, patch: &GoalPatch) -> StoreResult<Goal> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut goal = load_goal(&tx, id)?.ok_or(StoreError::NotFound(id))?;
    let now = now_epoch_ms().max(goal.updated_at);

    if let Some(content) = &patch.content {
        goal.content = content.trim().to_string();
    }
    if let Some(completed) = patch.completed {
        goal.completed = completed;
    }
    tx.execute(
        "UPDATE goals SET content = ?2, completed = ?3, updated_at = ?4 WHERE id = ?1;",
        params![id.to_string(), goal.content.as_str(), bool_to_int(goal.completed), now],
    )?;

    if let Some(target) = patch.position {
        let mut ordered = ordered_ids(&tx)?;
        ordered.retain(|other| *other != id);
        let index = usize::try_from(target).unwrap_or(0).min(ordered.len());
        ordered.insert(index, id);
        reindex(&tx, &ordered, now)?;
    }

    let goal = load_goal(&tx, id)?.ok_or(StoreError::NotFound(id))?;
    tx.commit()?;
    Ok(goal)
}

fn delete_goal_tx(conn: &mut Connection, id: GoalId) -> StoreResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let changed = tx.execute("DELETE FROM goals WHERE id = ?1;", [id.to_string()])?;
    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }
    let remaining = ordered_ids(&tx)?;
    reindex(&tx, &remaining, now_epoch_ms())?;
    tx.commit()?;
    Ok(())
}

fn ordered_ids(conn: &Connection) -> StoreResult<Vec<GoalId>> {
    let mut stmt =
        conn.prepare("SELECT id FROM goals ORDER BY position ASC, created_at ASC, rowid ASC;")?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "goals.id")?);
    }
    Ok(ids)
}

fn reindex(conn: &Connection, ordered: &[GoalId], now: i64) -> StoreResult<()> {
    for (index, id) in ordered.iter().enumerate() {
        conn.execute(
            "UPDATE goals
             SET position = ?2,
                 updated_at = ?3
             WHERE id = ?1
               AND position != ?2;",
            params![id.to_string(), index as i64, now],
        )?;
    }
    Ok(())
}

fn parse_goal_row(row: &Row<'_>) -> StoreResult<Goal> {
    let id_text: String = row.get("id")?;
    Ok(Goal {
        id: parse_uuid(&id_text, "goals.id")?,
        content: row.get("content")?,
        completed: parse_bool(row.get("completed")?, "goals.completed")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
