//! Named mutation operations over the task store.
//!
//! Each operation translates to exactly one adapter write; subtask
//! operations are one authoritative read plus one write of the whole
//! subtask sequence. Nothing here retries: a failed write is reported to
//! the caller and local state catches up on the next subscription push.
//!
//! Two concurrent subtask operations on the same task can both read the
//! old sequence before either writes, and the second write wins. That
//! lost-update window follows from whole-sequence writes and is left
//! intact; see the service tests for a demonstration.

use crate::error::StoreResult;
use crate::store::TaskStore;
use crate::types::{
    NewTask, OwnerScope, Subtask, SubtaskPatch, Task, TaskPatch, TaskStatus,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// What a mutation actually did. Missing-task no-ops are deliberate
/// tolerance of concurrent deletes, surfaced here so callers and tests
/// can observe them instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    MissingTask,
    NoOwner,
}

/// Mutation service scoped to one owner.
pub struct MutationService<S: TaskStore> {
    store: Arc<S>,
    owner: OwnerScope,
}

impl<S: TaskStore> MutationService<S> {
    pub fn new(store: Arc<S>, owner: OwnerScope) -> Self {
        Self { store, owner }
    }

    pub fn owner(&self) -> &OwnerScope {
        &self.owner
    }

    /// Create a task with the add-task defaults: status Upcoming, a
    /// deadline 24 hours out, zero duration, and optionally one initial
    /// subtask dated now. Returns `None` without an owner scope.
    pub async fn add_task(
        &self,
        title: &str,
        initial_subtask: Option<&str>,
    ) -> StoreResult<Option<Task>> {
        let Some(owner_id) = self.owner.id() else {
            warn!(op = "add_task", "mutation without owner scope ignored");
            return Ok(None);
        };

        let now = Utc::now();
        let subtasks = match initial_subtask {
            Some(subtask_title) => vec![Subtask {
                id: fresh_id(),
                title: subtask_title.to_string(),
                completed: false,
                date: Some(now),
            }],
            None => vec![],
        };

        let task = self
            .store
            .create_task(
                owner_id,
                NewTask {
                    title: title.to_string(),
                    duration: 0,
                    start_time: None,
                    deadline: Some(now + Duration::hours(24)),
                    status: TaskStatus::Upcoming,
                    subtasks,
                },
            )
            .await?;

        Ok(Some(task))
    }

    /// Set `status` only.
    pub async fn move_task(
        &self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> StoreResult<MutationOutcome> {
        self.apply_patch(
            "move_task",
            task_id,
            TaskPatch {
                status: Some(new_status),
                ..Default::default()
            },
        )
        .await
    }

    /// Merge arbitrary allowed fields (`title`, `status`, `start_time`,
    /// `deadline`). Subtask changes go through the dedicated operations
    /// below, so a `subtasks` field in the patch is discarded here.
    pub async fn update_task(
        &self,
        task_id: &str,
        mut patch: TaskPatch,
    ) -> StoreResult<MutationOutcome> {
        patch.subtasks = None;
        self.apply_patch("update_task", task_id, patch).await
    }

    /// Remove the task and its subtasks.
    pub async fn delete_task(&self, task_id: &str) -> StoreResult<MutationOutcome> {
        if self.owner.id().is_none() {
            warn!(op = "delete_task", "mutation without owner scope ignored");
            return Ok(MutationOutcome::NoOwner);
        }

        if self.store.remove_task(task_id).await? {
            Ok(MutationOutcome::Applied)
        } else {
            warn!(op = "delete_task", task_id, "task missing, nothing deleted");
            Ok(MutationOutcome::MissingTask)
        }
    }

    /// Flip `completed` on the matching subtask.
    pub async fn toggle_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> StoreResult<MutationOutcome> {
        self.with_subtasks("toggle_subtask", task_id, |subtasks| {
            subtasks
                .into_iter()
                .map(|mut s| {
                    if s.id == subtask_id {
                        s.completed = !s.completed;
                    }
                    s
                })
                .collect()
        })
        .await
    }

    /// Append a new subtask with a fresh id, dated `date` or now.
    pub async fn add_subtask(
        &self,
        task_id: &str,
        title: &str,
        date: Option<chrono::DateTime<Utc>>,
    ) -> StoreResult<MutationOutcome> {
        let subtask = Subtask {
            id: fresh_id(),
            title: title.to_string(),
            completed: false,
            date: Some(date.unwrap_or_else(Utc::now)),
        };
        self.with_subtasks("add_subtask", task_id, |mut subtasks| {
            subtasks.push(subtask);
            subtasks
        })
        .await
    }

    /// Merge updates into the matching subtask only.
    pub async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> StoreResult<MutationOutcome> {
        self.with_subtasks("update_subtask", task_id, |subtasks| {
            subtasks
                .into_iter()
                .map(|mut s| {
                    if s.id == subtask_id {
                        if let Some(title) = &patch.title {
                            s.title = title.clone();
                        }
                        if let Some(completed) = patch.completed {
                            s.completed = completed;
                        }
                        if let Some(date) = patch.date {
                            s.date = date;
                        }
                    }
                    s
                })
                .collect()
        })
        .await
    }

    /// Remove the matching subtask, preserving the order of the rest.
    pub async fn delete_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
    ) -> StoreResult<MutationOutcome> {
        self.with_subtasks("delete_subtask", task_id, |subtasks| {
            subtasks.into_iter().filter(|s| s.id != subtask_id).collect()
        })
        .await
    }

    /// Replace the whole sequence with the caller-supplied order. The
    /// caller is responsible for it being a permutation of the existing
    /// subtasks; no validation happens here.
    pub async fn reorder_subtasks(
        &self,
        task_id: &str,
        new_order: Vec<Subtask>,
    ) -> StoreResult<MutationOutcome> {
        self.with_subtasks("reorder_subtasks", task_id, move |_| new_order)
            .await
    }

    /// Read-modify-write of the whole subtask sequence. The current
    /// sequence comes from the authoritative store, never from caller
    /// state, so independent field edits cannot resurrect stale
    /// sequences; concurrent sequence edits still race (last writer
    /// wins).
    async fn with_subtasks<F>(
        &self,
        op: &'static str,
        task_id: &str,
        transform: F,
    ) -> StoreResult<MutationOutcome>
    where
        F: FnOnce(Vec<Subtask>) -> Vec<Subtask>,
    {
        if self.owner.id().is_none() {
            warn!(op, "mutation without owner scope ignored");
            return Ok(MutationOutcome::NoOwner);
        }

        let Some(task) = self.store.get_task(task_id).await? else {
            warn!(op, task_id, "task missing, subtask operation skipped");
            return Ok(MutationOutcome::MissingTask);
        };

        let new_subtasks = transform(task.subtasks);
        let patch = TaskPatch {
            subtasks: Some(new_subtasks),
            ..Default::default()
        };

        if self.store.update_task(task_id, patch).await? {
            Ok(MutationOutcome::Applied)
        } else {
            // Deleted between our read and write; same tolerance as a
            // missing read.
            warn!(op, task_id, "task vanished mid-write, subtask operation skipped");
            Ok(MutationOutcome::MissingTask)
        }
    }

    async fn apply_patch(
        &self,
        op: &'static str,
        task_id: &str,
        patch: TaskPatch,
    ) -> StoreResult<MutationOutcome> {
        if self.owner.id().is_none() {
            warn!(op, "mutation without owner scope ignored");
            return Ok(MutationOutcome::NoOwner);
        }

        if self.store.update_task(task_id, patch).await? {
            Ok(MutationOutcome::Applied)
        } else {
            warn!(op, task_id, "task missing, update skipped");
            Ok(MutationOutcome::MissingTask)
        }
    }
}

fn fresh_id() -> String {
    Uuid::now_v7().to_string()
}
