//! Persistence contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the async store contracts the planner coordinators consume.
//! - Keep SQL details inside the repository boundary.
//!
//! # Invariants
//! - Store writes validate their command before touching SQL.
//! - Store APIs return semantic errors (`NotFound`, `Validation`,
//!   `PartialBatch`) in addition to transport errors.
//! - Both SQLite stores may share one connection; access is serialized by the
//!   connection mutex.

use crate::db::migrations::latest_version;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod error;
pub mod goal_repo;
pub mod task_repo;

pub use error::{BatchItemFailure, StoreError, StoreResult};

/// Migrated connection shared between SQLite-backed stores.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Checks schema version and required table shape, then wraps the connection
/// for sharing between stores.
pub fn share_connection(conn: Connection) -> StoreResult<SharedConnection> {
    ensure_connection_ready(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in [
        (
            "weekly_tasks",
            &[
                "id",
                "content",
                "day_of_week",
                "week_offset",
                "completed",
                "parent_task_id",
                "position",
                "created_at",
                "updated_at",
            ][..],
        ),
        (
            "goals",
            &[
                "id",
                "content",
                "completed",
                "position",
                "created_at",
                "updated_at",
            ][..],
        ),
    ] {
        let existing = table_columns(conn, table)?;
        if existing.is_empty() {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !existing.iter().any(|name| name.as_str() == column) {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_bool(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
