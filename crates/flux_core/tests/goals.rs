use flux_core::db::open_db_in_memory;
use flux_core::{GoalPatch, GoalStore, SqliteGoalStore, StoreError, ValidationError};
use uuid::Uuid;

fn memory_goal_store() -> SqliteGoalStore {
    SqliteGoalStore::try_new(open_db_in_memory().unwrap()).unwrap()
}

async fn positions(store: &SqliteGoalStore) -> Vec<(String, i64)> {
    store
        .list_goals()
        .await
        .unwrap()
        .into_iter()
        .map(|goal| (goal.content, goal.position))
        .collect()
}

#[tokio::test]
async fn goals_append_with_contiguous_positions() {
    let store = memory_goal_store();
    let first = store.insert_goal("run a marathon").await.unwrap();
    let second = store.insert_goal("  learn rust  ").await.unwrap();

    assert_eq!(first.position, 0);
    assert_eq!(second.position, 1);
    assert_eq!(second.content, "learn rust");
    assert!(!second.completed);
}

#[tokio::test]
async fn blank_goal_is_rejected() {
    let store = memory_goal_store();
    let err = store.insert_goal("   ").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(ValidationError::EmptyContent)));
}

#[tokio::test]
async fn moving_a_goal_reindexes_the_list() {
    let store = memory_goal_store();
    store.insert_goal("a").await.unwrap();
    store.insert_goal("b").await.unwrap();
    let c = store.insert_goal("c").await.unwrap();

    let moved = store
        .update_goal(
            c.id,
            &GoalPatch {
                position: Some(0),
                ..GoalPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.position, 0);
    assert_eq!(
        positions(&store).await,
        vec![
            ("c".to_string(), 0),
            ("a".to_string(), 1),
            ("b".to_string(), 2)
        ]
    );

    // Targets past the end clamp to the last slot.
    store
        .update_goal(
            c.id,
            &GoalPatch {
                position: Some(40),
                ..GoalPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(positions(&store).await[2], ("c".to_string(), 2));
}

#[tokio::test]
async fn completing_and_deleting_goals() {
    let store = memory_goal_store();
    let a = store.insert_goal("a").await.unwrap();
    let b = store.insert_goal("b").await.unwrap();
    store.insert_goal("c").await.unwrap();

    let done = store
        .update_goal(
            b.id,
            &GoalPatch {
                completed: Some(true),
                ..GoalPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(done.completed);

    store.delete_goal(a.id).await.unwrap();
    assert_eq!(
        positions(&store).await,
        vec![("b".to_string(), 0), ("c".to_string(), 1)]
    );

    let missing = Uuid::new_v4();
    let err = store.delete_goal(missing).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}
