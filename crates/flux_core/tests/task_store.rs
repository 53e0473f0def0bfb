mod common;

use common::memory_task_store;
use flux_core::planner::position::{is_contiguous, sequential_positions};
use flux_core::planner::tree::{build_task_tree, flatten_forest};
use flux_core::{
    NewTask, PositionUpdate, StoreError, Task, TaskPatch, TaskStore, ValidationError,
};
use uuid::Uuid;

async fn top_level(store: &impl TaskStore, content: &str, day: u8) -> Task {
    store
        .insert_task(&NewTask::top_level(content, day, 0))
        .await
        .unwrap()
}

async fn subtask(store: &impl TaskStore, parent: &Task, content: &str) -> Task {
    store
        .insert_task(&NewTask::subtask(parent, content))
        .await
        .unwrap()
}

fn day_is_contiguous(tasks: &[Task], day: u8) -> bool {
    let positions = positions_of(tasks, day)
        .into_iter()
        .map(|(_, position)| position)
        .collect::<Vec<_>>();
    is_contiguous(&positions)
}

fn positions_of(tasks: &[Task], day: u8) -> Vec<(Uuid, i64)> {
    tasks
        .iter()
        .filter(|task| task.day_of_week == day && task.is_top_level())
        .map(|task| (task.id, task.position))
        .collect()
}

#[tokio::test]
async fn first_task_on_empty_day_gets_position_zero() {
    let store = memory_task_store();
    let task = top_level(&store, "buy milk", 2).await;

    assert_eq!(task.position, 0);
    assert!(!task.completed);
    assert_eq!(task.day_of_week, 2);
    assert_eq!(task.week_offset, 0);
    assert!(task.parent_task_id.is_none());
}

#[tokio::test]
async fn top_level_inserts_append_after_highest_position() {
    let store = memory_task_store();
    let a = top_level(&store, "a", 1).await;
    let b = top_level(&store, "b", 1).await;
    store
        .update_task(
            b.id,
            &TaskPatch {
                position: Some(7),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();

    let c = top_level(&store, "c", 1).await;
    let other_day = top_level(&store, "d", 2).await;

    assert_eq!(a.position, 0);
    assert_eq!(c.position, 8);
    assert_eq!(other_day.position, 0);
}

#[tokio::test]
async fn subtasks_inherit_parent_scope_and_placeholder_position() {
    let store = memory_task_store();
    let parent = top_level(&store, "parent", 4).await;
    let child = store
        .insert_task(&NewTask {
            content: "child".to_string(),
            day_of_week: 0,
            week_offset: 9,
            parent_task_id: Some(parent.id),
        })
        .await
        .unwrap();

    assert_eq!(child.parent_task_id, Some(parent.id));
    assert_eq!(child.day_of_week, 4);
    assert_eq!(child.week_offset, 0);
    assert_eq!(child.position, 0);
}

#[tokio::test]
async fn insert_rejects_blank_content_and_unknown_parent() {
    let store = memory_task_store();

    let err = store
        .insert_task(&NewTask::top_level("   ", 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(ValidationError::EmptyContent)));

    let missing = Uuid::new_v4();
    let err = store
        .insert_task(&NewTask {
            content: "orphan".to_string(),
            day_of_week: 1,
            week_offset: 0,
            parent_task_id: Some(missing),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

#[tokio::test]
async fn list_is_scoped_to_week_and_ordered_by_day_then_position() {
    let store = memory_task_store();
    let later_day = top_level(&store, "friday", 5).await;
    let first = top_level(&store, "monday 1", 1).await;
    let second = top_level(&store, "monday 2", 1).await;
    store
        .insert_task(&NewTask::top_level("next week", 1, 1))
        .await
        .unwrap();

    let tasks = store.list_tasks(0).await.unwrap();
    let ids = tasks.iter().map(|task| task.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![first.id, second.id, later_day.id]);
    assert!(day_is_contiguous(&tasks, 1));
    assert!(day_is_contiguous(&tasks, 5));
}

#[tokio::test]
async fn delete_removes_all_nested_subtasks_and_compacts_positions() {
    let store = memory_task_store();
    let keep_before = top_level(&store, "before", 3).await;
    let parent = top_level(&store, "parent", 3).await;
    let keep_after = top_level(&store, "after", 3).await;
    let child_a = subtask(&store, &parent, "a").await;
    let child_b = subtask(&store, &parent, "b").await;
    let grandchild = subtask(&store, &child_a, "a.1").await;

    store.delete_task(parent.id).await.unwrap();

    let tasks = store.list_tasks(0).await.unwrap();
    for gone in [parent.id, child_a.id, child_b.id, grandchild.id] {
        assert!(tasks.iter().all(|task| task.id != gone));
    }
    let forest = build_task_tree(&tasks);
    assert_eq!(flatten_forest(&forest).len(), 2);
    assert_eq!(
        positions_of(&tasks, 3),
        vec![(keep_before.id, 0), (keep_after.id, 1)]
    );
    assert!(day_is_contiguous(&tasks, 3));
}

#[tokio::test]
async fn delete_and_update_of_unknown_id_report_not_found() {
    let store = memory_task_store();
    let missing = Uuid::new_v4();

    let err = store.delete_task(missing).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));

    let err = store
        .update_task(missing, &TaskPatch::completed(true))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn moving_a_task_carries_its_subtasks_and_keeps_position() {
    let store = memory_task_store();
    top_level(&store, "first", 1).await;
    let parent = top_level(&store, "parent", 1).await;
    let child = subtask(&store, &parent, "child").await;
    let grandchild = subtask(&store, &child, "grandchild").await;

    let moved = store
        .update_task(parent.id, &TaskPatch::day_of_week(6))
        .await
        .unwrap();
    assert_eq!(moved.day_of_week, 6);
    assert_eq!(moved.position, 1);

    let child = store.get_task(child.id).await.unwrap().unwrap();
    let grandchild = store.get_task(grandchild.id).await.unwrap().unwrap();
    assert_eq!(child.day_of_week, 6);
    assert_eq!(grandchild.day_of_week, 6);
}

#[tokio::test]
async fn subtasks_cannot_change_scope_alone() {
    let store = memory_task_store();
    let parent = top_level(&store, "parent", 1).await;
    let child = subtask(&store, &parent, "child").await;

    let err = store
        .update_task(child.id, &TaskPatch::day_of_week(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::SubtaskScopeChange)
    ));

    let toggled = store
        .update_task(child.id, &TaskPatch::completed(true))
        .await
        .unwrap();
    assert!(toggled.completed);
}

#[tokio::test]
async fn update_trims_content_and_keeps_untouched_fields() {
    let store = memory_task_store();
    let task = top_level(&store, "draft", 0).await;

    let updated = store
        .update_task(task.id, &TaskPatch::content("  final  "))
        .await
        .unwrap();
    assert_eq!(updated.content, "final");
    assert!(!updated.completed);
    assert!(updated.updated_at >= task.updated_at);
    assert_eq!(updated.created_at, task.created_at);
}

#[tokio::test]
async fn independent_batch_applies_good_items_and_names_the_failed_one() {
    let store = memory_task_store();
    let a = top_level(&store, "a", 2).await;
    let c = top_level(&store, "c", 2).await;
    let missing = Uuid::new_v4();

    let err = store
        .batch_update_positions(&[
            PositionUpdate {
                id: c.id,
                position: 0,
            },
            PositionUpdate {
                id: missing,
                position: 1,
            },
            PositionUpdate {
                id: a.id,
                position: 2,
            },
        ])
        .await
        .unwrap_err();

    match &err {
        StoreError::PartialBatch(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].id, missing);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains(&missing.to_string()));

    let tasks = store.list_tasks(0).await.unwrap();
    assert_eq!(positions_of(&tasks, 2), vec![(c.id, 0), (a.id, 2)]);
}

#[tokio::test]
async fn transactional_batch_applies_nothing_when_one_item_fails() {
    let store = memory_task_store();
    let a = top_level(&store, "a", 2).await;
    let c = top_level(&store, "c", 2).await;
    let missing = Uuid::new_v4();

    let err = store
        .batch_update_positions_atomic(&[
            PositionUpdate {
                id: c.id,
                position: 0,
            },
            PositionUpdate {
                id: missing,
                position: 1,
            },
            PositionUpdate {
                id: a.id,
                position: 2,
            },
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));

    let tasks = store.list_tasks(0).await.unwrap();
    assert_eq!(positions_of(&tasks, 2), vec![(a.id, 0), (c.id, 1)]);
    assert!(day_is_contiguous(&tasks, 2));
}

#[tokio::test]
async fn transactional_batch_writes_every_position() {
    let store = memory_task_store();
    let a = top_level(&store, "a", 2).await;
    let b = top_level(&store, "b", 2).await;
    let c = top_level(&store, "c", 2).await;

    store
        .batch_update_positions_atomic(&sequential_positions(&[c.id, a.id, b.id]))
        .await
        .unwrap();

    let tasks = store.list_tasks(0).await.unwrap();
    assert_eq!(positions_of(&tasks, 2), vec![(c.id, 0), (a.id, 1), (b.id, 2)]);
    assert!(day_is_contiguous(&tasks, 2));
}

#[tokio::test]
async fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flux.db");

    let id = {
        let store =
            flux_core::SqliteTaskStore::try_new(flux_core::open_db(&path).unwrap()).unwrap();
        top_level(&store, "persisted", 6).await.id
    };

    let reopened =
        flux_core::SqliteTaskStore::try_new(flux_core::open_db(&path).unwrap()).unwrap();
    let task = reopened.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.content, "persisted");
    assert_eq!(task.day_of_week, 6);
}
