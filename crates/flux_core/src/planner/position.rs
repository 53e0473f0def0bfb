//! Ordering slot allocation for top-level tasks and goals.
//!
//! The SQLite stores call [`next_position`] inside the same `IMMEDIATE`
//! transaction as the insert, so two concurrent inserts into one scope cannot
//! read the same maximum.

use crate::model::task::PositionUpdate;
use uuid::Uuid;

/// Slot for a new item appended to a scope whose current maximum is `max`.
pub fn next_position(max: Option<i64>) -> i64 {
    max.map_or(0, |value| value + 1)
}

/// Assigns `position = index` to ids in the given order.
pub fn sequential_positions(ordered_ids: &[Uuid]) -> Vec<PositionUpdate> {
    ordered_ids
        .iter()
        .enumerate()
        .map(|(index, id)| PositionUpdate {
            id: *id,
            position: index as i64,
        })
        .collect()
}

/// Returns whether `positions`, in any order, are exactly `0..len`.
pub fn is_contiguous(positions: &[i64]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(index, position)| *position == index as i64)
}

#[cfg(test)]
mod tests {
    use super::{is_contiguous, next_position, sequential_positions};
    use uuid::Uuid;

    #[test]
    fn empty_scope_starts_at_zero() {
        assert_eq!(next_position(None), 0);
        assert_eq!(next_position(Some(4)), 5);
    }

    #[test]
    fn sequential_positions_follow_input_order() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let updates = sequential_positions(&ids);
        assert_eq!(
            updates.iter().map(|u| (u.id, u.position)).collect::<Vec<_>>(),
            vec![(ids[0], 0), (ids[1], 1), (ids[2], 2)]
        );
    }

    #[test]
    fn contiguity_check_ignores_order_and_rejects_gaps() {
        assert!(is_contiguous(&[]));
        assert!(is_contiguous(&[2, 0, 1]));
        assert!(!is_contiguous(&[0, 2]));
        assert!(!is_contiguous(&[0, 0, 1]));
    }
}
