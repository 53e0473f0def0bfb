//! Planner domain model.
//!
//! # Responsibility
//! - Define the canonical records shared by stores, coordinators and the
//!   request service layer.
//! - Own field-level validation so every write path enforces the same rules.
//!
//! # Invariants
//! - Every record is identified by a stable UUID assigned at insert time.
//! - Timestamps are Unix epoch milliseconds (UTC).

pub mod goal;
pub mod task;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
