//! Day forest builder.
//!
//! Turns a flat, day-scoped task list into ordered nested nodes. The forest is
//! a plain value tree built from a parent -> children adjacency map on every
//! call; no parent pointers are kept.

use crate::model::task::{Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One task with its nested subtasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<TaskNode>,
}

/// Builds the ordered forest for one `(week_offset, day_of_week)` scope.
///
/// - Roots are ordered by `position`, then `created_at`.
/// - Children are ordered by `created_at`; ties keep input order.
/// - A child whose parent is not in `tasks` is dropped, not promoted.
pub fn build_task_tree(tasks: &[Task]) -> Vec<TaskNode> {
    let mut roots = Vec::new();
    let mut children: HashMap<TaskId, Vec<&Task>> = HashMap::new();
    for task in tasks {
        match task.parent_task_id {
            None => roots.push(task),
            Some(parent_id) => children.entry(parent_id).or_default().push(task),
        }
    }

    roots.sort_by_key(|task| (task.position, task.created_at));
    for siblings in children.values_mut() {
        siblings.sort_by_key(|task| task.created_at);
    }

    roots
        .into_iter()
        .map(|task| attach_subtasks(task, &children))
        .collect()
}

fn attach_subtasks(task: &Task, children: &HashMap<TaskId, Vec<&Task>>) -> TaskNode {
    let subtasks = children
        .get(&task.id)
        .map(|siblings| {
            siblings
                .iter()
                .map(|child| attach_subtasks(child, children))
                .collect()
        })
        .unwrap_or_default();
    TaskNode {
        task: task.clone(),
        subtasks,
    }
}

/// Pre-order walk of a forest.
pub fn flatten_forest(forest: &[TaskNode]) -> Vec<&Task> {
    fn walk<'a>(nodes: &'a [TaskNode], out: &mut Vec<&'a Task>) {
        for node in nodes {
            out.push(&node.task);
            walk(&node.subtasks, out);
        }
    }

    let mut out = Vec::new();
    walk(forest, &mut out);
    out
}

/// Total number of nodes at every depth.
pub fn count_nodes(forest: &[TaskNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_nodes(&node.subtasks))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{build_task_tree, count_nodes, flatten_forest};
    use crate::model::task::Task;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn task(parent: Option<Uuid>, position: i64, created_at: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            content: format!("task {created_at}"),
            day_of_week: 1,
            week_offset: 0,
            completed: false,
            parent_task_id: parent,
            position,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn roots_sort_by_position_then_created_at() {
        let late = task(None, 0, 20);
        let early = task(None, 0, 10);
        let second = task(None, 1, 5);
        let forest = build_task_tree(&[second.clone(), late.clone(), early.clone()]);
        let ids = forest.iter().map(|node| node.task.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![early.id, late.id, second.id]);
    }

    #[test]
    fn children_nest_to_any_depth_in_creation_order() {
        let root = task(None, 0, 1);
        let child_b = task(Some(root.id), 0, 30);
        let child_a = task(Some(root.id), 0, 20);
        let grandchild = task(Some(child_a.id), 0, 40);

        let forest = build_task_tree(&[
            grandchild.clone(),
            child_b.clone(),
            root.clone(),
            child_a.clone(),
        ]);

        assert_eq!(forest.len(), 1);
        let subtasks = &forest[0].subtasks;
        assert_eq!(subtasks[0].task.id, child_a.id);
        assert_eq!(subtasks[1].task.id, child_b.id);
        assert_eq!(subtasks[0].subtasks[0].task.id, grandchild.id);
    }

    #[test]
    fn orphans_are_dropped_not_promoted() {
        let root = task(None, 0, 1);
        let orphan = task(Some(Uuid::new_v4()), 0, 2);
        let orphan_child = task(Some(orphan.id), 0, 3);

        let forest = build_task_tree(&[root.clone(), orphan, orphan_child]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].task.id, root.id);
        assert_eq!(count_nodes(&forest), 1);
    }

    #[test]
    fn flattening_returns_every_input_exactly_once() {
        let root_a = task(None, 0, 1);
        let root_b = task(None, 1, 2);
        let a1 = task(Some(root_a.id), 0, 3);
        let a2 = task(Some(root_a.id), 0, 4);
        let a1x = task(Some(a1.id), 0, 5);
        let b1 = task(Some(root_b.id), 0, 6);
        let input = vec![b1, a1x, root_b, a2, root_a, a1];

        let forest = build_task_tree(&input);
        let flattened = flatten_forest(&forest);
        assert_eq!(flattened.len(), input.len());
        let expected = input.iter().map(|t| t.id).collect::<HashSet<_>>();
        let actual = flattened.iter().map(|t| t.id).collect::<HashSet<_>>();
        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        assert!(build_task_tree(&[]).is_empty());
    }
}
