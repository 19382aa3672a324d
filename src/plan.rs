//! The "plan now" trigger: snapshot, optimize, reconcile.

use crate::error::StoreResult;
use crate::optimizer::optimize;
use crate::reconcile::{ReconcileReport, reconcile};
use crate::service::MutationService;
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use tracing::info;

/// Summary of one planning run.
#[derive(Debug)]
pub struct PlanOutcome {
    /// How many tasks were in the snapshot the optimizer saw.
    pub scanned: usize,
    pub report: ReconcileReport,
}

/// Run the optimizer over the owner's current task list and persist the
/// deltas. With no owner scope this is a no-op over an empty snapshot.
pub async fn run_plan<S: TaskStore>(
    store: &S,
    service: &MutationService<S>,
    now: DateTime<Utc>,
) -> StoreResult<PlanOutcome> {
    let snapshot = match service.owner().id() {
        Some(owner_id) => store.list_tasks(owner_id).await?,
        None => Vec::new(),
    };

    let proposed = optimize(&snapshot, now);
    let report = reconcile(&snapshot, &proposed, service).await;

    info!(
        scanned = snapshot.len(),
        updated = report.updated.len(),
        "plan run finished"
    );

    Ok(PlanOutcome {
        scanned: snapshot.len(),
        report,
    })
}
