#![allow(dead_code)]

use async_trait::async_trait;
use flux_core::db::open_db_in_memory;
use flux_core::{
    NewTask, PositionUpdate, SqliteTaskStore, StoreError, StoreResult, Task, TaskId, TaskPatch,
    TaskStore,
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn memory_task_store() -> SqliteTaskStore {
    SqliteTaskStore::try_new(open_db_in_memory().unwrap()).unwrap()
}

/// Which store calls fail with an injected backend error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    pub batch: bool,
    pub list: bool,
}

/// One batch position write seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub atomic: bool,
    pub updates: Vec<PositionUpdate>,
}

/// SQLite task store that records batch writes and fails on demand.
pub struct FaultyTaskStore {
    inner: SqliteTaskStore,
    faults: Mutex<Faults>,
    batches: Mutex<Vec<BatchCall>>,
    insert_gate: Mutex<Option<Arc<Notify>>>,
}

impl FaultyTaskStore {
    pub fn new() -> Self {
        Self {
            inner: memory_task_store(),
            faults: Mutex::new(Faults::default()),
            batches: Mutex::new(Vec::new()),
            insert_gate: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &SqliteTaskStore {
        &self.inner
    }

    pub fn set_faults(&self, update: impl FnOnce(&mut Faults)) {
        update(&mut self.faults.lock().unwrap());
    }

    pub fn batches(&self) -> Vec<BatchCall> {
        self.batches.lock().unwrap().clone()
    }

    /// Makes every later insert wait until the returned handle is notified.
    pub fn gate_inserts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.insert_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn faults(&self) -> Faults {
        *self.faults.lock().unwrap()
    }
}

fn injected() -> StoreError {
    StoreError::Backend("injected failure".to_string())
}

#[async_trait]
impl TaskStore for FaultyTaskStore {
    async fn list_tasks(&self, week_offset: i32) -> StoreResult<Vec<Task>> {
        if self.faults().list {
            return Err(injected());
        }
        self.inner.list_tasks(week_offset).await
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.inner.get_task(id).await
    }

    async fn insert_task(&self, new_task: &NewTask) -> StoreResult<Task> {
        let gate = self.insert_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.faults().insert {
            return Err(injected());
        }
        self.inner.insert_task(new_task).await
    }

    async fn update_task(&self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        if self.faults().update {
            return Err(injected());
        }
        self.inner.update_task(id, patch).await
    }

    async fn batch_update_positions(&self, updates: &[PositionUpdate]) -> StoreResult<()> {
        self.batches.lock().unwrap().push(BatchCall {
            atomic: false,
            updates: updates.to_vec(),
        });
        if self.faults().batch {
            return Err(injected());
        }
        self.inner.batch_update_positions(updates).await
    }

    async fn batch_update_positions_atomic(&self, updates: &[PositionUpdate]) -> StoreResult<()> {
        self.batches.lock().unwrap().push(BatchCall {
            atomic: true,
            updates: updates.to_vec(),
        });
        if self.faults().batch {
            return Err(injected());
        }
        self.inner.batch_update_positions_atomic(updates).await
    }

    async fn delete_task(&self, id: TaskId) -> StoreResult<()> {
        if self.faults().delete {
            return Err(injected());
        }
        self.inner.delete_task(id).await
    }
}
