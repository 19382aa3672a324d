//! Reconciliation driver: diff an optimizer-proposed task list against
//! the live list and persist only the deltas.
//!
//! Change detection is per task, not per field: if `status` or
//! `start_time` differ, one update is issued carrying both fields.
//! Timestamps compare by millisecond; two absent values are equal. One
//! task's failure never blocks the rest of the pass — outcomes
//! accumulate in a [`ReconcileReport`].

use crate::error::StoreError;
use crate::service::{MutationOutcome, MutationService};
use crate::store::TaskStore;
use crate::types::{Task, TaskPatch};
use tracing::warn;

/// Per-task outcomes of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Tasks whose update was issued and applied.
    pub updated: Vec<String>,
    /// Tasks from `after` with no match in `before`. The optimizer never
    /// invents tasks, so this only fires on caller misuse; recorded
    /// rather than raised.
    pub skipped: Vec<String>,
    /// Tasks that vanished between optimization and write.
    pub missing: Vec<String>,
    /// Updates that failed at the store, by task id.
    pub failures: Vec<(String, StoreError)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.missing.is_empty() && self.failures.is_empty()
    }
}

/// Whether the two fields the optimizer touches differ between versions.
fn slot_changed(before: &Task, after: &Task) -> bool {
    let start_ms = |t: &Task| t.start_time.map(|v| v.timestamp_millis());
    before.status != after.status || start_ms(before) != start_ms(after)
}

/// Diff `before` vs `after` (matched by id) and issue one update per
/// changed task, carrying both `status` and `start_time`.
pub async fn reconcile<S: TaskStore>(
    before: &[Task],
    after: &[Task],
    service: &MutationService<S>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for proposed in after {
        let Some(original) = before.iter().find(|t| t.id == proposed.id) else {
            warn!(task_id = %proposed.id, "proposed task has no live counterpart, skipping");
            report.skipped.push(proposed.id.clone());
            continue;
        };

        if !slot_changed(original, proposed) {
            continue;
        }

        let patch = TaskPatch {
            status: Some(proposed.status),
            start_time: Some(proposed.start_time),
            ..Default::default()
        };

        match service.update_task(&proposed.id, patch).await {
            Ok(MutationOutcome::Applied) => report.updated.push(proposed.id.clone()),
            Ok(MutationOutcome::MissingTask) => report.missing.push(proposed.id.clone()),
            Ok(MutationOutcome::NoOwner) => {
                // No owner scope means every remaining update would also
                // no-op; stop early.
                break;
            }
            Err(err) => {
                warn!(task_id = %proposed.id, error = %err, "reconcile update failed");
                report.failures.push((proposed.id.clone(), err));
            }
        }
    }

    report
}
