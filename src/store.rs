//! Store adapter boundary.
//!
//! `TaskStore` abstracts the document store backing the task list:
//! owner-scoped query, point read, create, merge-update, delete, plus a
//! change-event channel. The SQLite implementation lives in [`crate::db`];
//! the trait exists so the mutation service and the reconciliation driver
//! can be exercised against a recording store in tests.
//!
//! Subscriptions are snapshot-based: a [`TaskFeed`] emits the complete,
//! current task set for one owner whenever any of that owner's task
//! documents change. Snapshots are authoritative-at-time-of-receipt and
//! are never deltas, so a receiver that misses events simply collapses
//! them into its next snapshot.

use crate::db::Database;
use crate::error::StoreResult;
use crate::types::{NewTask, OwnerScope, Task, TaskPatch};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What kind of document change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

/// A change notification. Carries only the owner whose task set changed;
/// subscribers re-query a full snapshot rather than patching state.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub owner_id: String,
    pub kind: ChangeKind,
}

/// Read/write contract the core requires of the document store.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// The complete task set owned by `owner_id`, in creation order.
    async fn list_tasks(&self, owner_id: &str) -> StoreResult<Vec<Task>>;

    /// Point read of current state. Used by subtask operations to fetch
    /// the authoritative sequence before a read-modify-write.
    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>>;

    /// Insert a new task owned by `owner_id`.
    async fn create_task(&self, owner_id: &str, fields: NewTask) -> StoreResult<Task>;

    /// Merge the supplied fields into an existing task document.
    /// Returns false when the task does not exist.
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> StoreResult<bool>;

    /// Delete the task and its embedded subtasks.
    /// Returns false when the task does not exist.
    async fn remove_task(&self, task_id: &str) -> StoreResult<bool>;

    /// A fresh receiver on the change-event channel.
    fn events(&self) -> broadcast::Receiver<StoreEvent>;
}

#[async_trait]
impl TaskStore for Database {
    async fn list_tasks(&self, owner_id: &str) -> StoreResult<Vec<Task>> {
        Database::list_tasks(self, owner_id)
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        Database::get_task(self, task_id)
    }

    async fn create_task(&self, owner_id: &str, fields: NewTask) -> StoreResult<Task> {
        Database::create_task(self, owner_id, fields)
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> StoreResult<bool> {
        Database::update_task(self, task_id, &patch)
    }

    async fn remove_task(&self, task_id: &str) -> StoreResult<bool> {
        Database::remove_task(self, task_id)
    }

    fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_receiver()
    }
}

/// Live snapshot subscription for one owner.
///
/// The first call to [`TaskFeed::next`] yields the current snapshot
/// immediately; each later call waits for a change event touching the
/// owner and yields a freshly queried snapshot. Dropping the feed and
/// subscribing again yields a fresh snapshot (restartable).
pub struct TaskFeed<S: TaskStore> {
    store: Arc<S>,
    owner: OwnerScope,
    rx: broadcast::Receiver<StoreEvent>,
    initial_pending: bool,
}

/// Subscribe to snapshots of `owner`'s task list. An anonymous scope
/// yields a single empty snapshot and then waits forever (no events
/// carry it).
pub fn subscribe<S: TaskStore>(store: Arc<S>, owner: OwnerScope) -> TaskFeed<S> {
    let rx = store.events();
    TaskFeed {
        store,
        owner,
        rx,
        initial_pending: true,
    }
}

impl<S: TaskStore> TaskFeed<S> {
    /// Wait for the next snapshot. Returns `None` when the store's event
    /// channel is closed.
    pub async fn next(&mut self) -> Option<StoreResult<Vec<Task>>> {
        if self.initial_pending {
            self.initial_pending = false;
            return Some(self.snapshot().await);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if Some(event.owner_id.as_str()) == self.owner.id() {
                        return Some(self.snapshot().await);
                    }
                }
                // Missed events collapse into the next full snapshot.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(self.snapshot().await);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn snapshot(&self) -> StoreResult<Vec<Task>> {
        match self.owner.id() {
            Some(owner_id) => self.store.list_tasks(owner_id).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn fields(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            duration: 0,
            start_time: None,
            deadline: None,
            status: TaskStatus::Upcoming,
            subtasks: vec![],
        }
    }

    #[tokio::test]
    async fn feed_emits_initial_snapshot_then_updates() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_task("alice", fields("existing")).unwrap();

        let mut feed = subscribe(Arc::clone(&db), OwnerScope::user("alice"));

        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);

        db.create_task("alice", fields("fresh")).unwrap();
        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn feed_ignores_other_owners() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut feed = subscribe(Arc::clone(&db), OwnerScope::user("alice"));
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        // A write for bob then one for alice: the next snapshot is
        // alice's, and it already reflects her write only.
        db.create_task("bob", fields("not hers")).unwrap();
        db.create_task("alice", fields("hers")).unwrap();

        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "hers");
    }

    #[tokio::test]
    async fn anonymous_scope_sees_empty_snapshot() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_task("alice", fields("invisible")).unwrap();

        let mut feed = subscribe(Arc::clone(&db), OwnerScope::anonymous());
        assert!(feed.next().await.unwrap().unwrap().is_empty());
    }
}
