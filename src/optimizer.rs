//! Schedule optimization over an in-memory task list.
//!
//! `optimize` is a pure function of the task list and the wall clock. It
//! applies two ordered passes:
//!
//! 1. **Auto-backlog demotion** — a scheduled, non-Done task whose slot
//!    has fully elapsed is pulled back: status becomes Backlog and its
//!    `start_time` is cleared.
//! 2. **Backlog-to-slot promotion** — if any Backlog task remains and
//!    the next top-of-hour slot is free, the first Backlog task by list
//!    position is promoted to Upcoming with that slot as its start.
//!
//! At most one task is promoted per invocation. The input is never
//! mutated; relative order and untouched fields are preserved.

use crate::types::{Task, TaskStatus};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// A slot is "taken" when any scheduled start lies within this window of
/// the candidate. Coarse overlap heuristic, not true interval overlap.
const OCCUPANCY_WINDOW_MS: i64 = 60_000;

/// The next top-of-hour instant strictly after `now`.
pub fn next_slot(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = TimeDelta::hours(1);
    now.duration_trunc(hour).unwrap_or(now) + hour
}

/// Whether any task's scheduled start occupies `slot`.
fn slot_taken(tasks: &[Task], slot: DateTime<Utc>) -> bool {
    tasks.iter().any(|t| {
        t.start_time.is_some_and(|start| {
            (start.timestamp_millis() - slot.timestamp_millis()).abs() < OCCUPANCY_WINDOW_MS
        })
    })
}

/// Pass 1 for a single task: demote a missed slot, leave everything else
/// alone. Done tasks and unscheduled tasks are never touched.
fn demote_if_missed(mut task: Task, now: DateTime<Utc>) -> Task {
    if task.status != TaskStatus::Done
        && let Some(end) = task.end_time()
        && end < now
    {
        task.status = TaskStatus::Backlog;
        task.start_time = None;
    }
    task
}

/// Apply both passes and return the resulting task list.
pub fn optimize(tasks: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    let mut updated: Vec<Task> = tasks
        .iter()
        .cloned()
        .map(|t| demote_if_missed(t, now))
        .collect();

    let slot = next_slot(now);
    if updated.iter().any(|t| t.status == TaskStatus::Backlog)
        && !slot_taken(&updated, slot)
        && let Some(task) = updated.iter_mut().find(|t| t.status == TaskStatus::Backlog)
    {
        task.status = TaskStatus::Upcoming;
        task.start_time = Some(slot);
    }

    updated
}
