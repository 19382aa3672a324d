//! Core types for the Backlogg planner.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a task on the board.
///
/// The wire values are the display names ("Backlog", "Upcoming",
/// "Ongoing", "Done"), which is also how they are stored in the
/// `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Backlog,
    Upcoming,
    Ongoing,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::Upcoming => "Upcoming",
            TaskStatus::Ongoing => "Ongoing",
            TaskStatus::Done => "Done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Backlog" => Some(TaskStatus::Backlog),
            "Upcoming" => Some(TaskStatus::Upcoming),
            "Ongoing" => Some(TaskStatus::Ongoing),
            "Done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// An ordered sub-activity owned by a task.
///
/// `date` is informational (timeline display) and has no scheduling
/// effect. The whole subtask sequence is replaced on every subtask-level
/// write, so relative order is exactly what the last writer stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Slot length in minutes. Legacy field, may be zero; only used to
    /// compute the end of an allocated slot when `start_time` is set.
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// End of the currently allocated slot, if one is assigned.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start + Duration::minutes(i64::from(self.duration)))
    }
}

/// Fields for creating a task. Unset fields take their schema defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

/// Partial-field update for a task.
///
/// `None` leaves a field untouched; the store merges only what is
/// supplied, never a full replace. `start_time` and `deadline` are
/// double-optional so a patch can distinguish "keep" (`None`) from
/// "clear" (`Some(None)`) — demotion clears `start_time` this way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.start_time.is_none()
            && self.deadline.is_none()
            && self.subtasks.is_none()
    }
}

/// Partial-field update for a single subtask, merged into the matching
/// element during a read-modify-write of the whole sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<Option<DateTime<Utc>>>,
}

/// Deserialize a present-but-possibly-null field as `Some(Option<T>)`,
/// so absent fields stay `None` via `#[serde(default)]`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// The identity partitioning which tasks belong to which user.
///
/// Threaded explicitly into store and service calls — never ambient
/// state. `anonymous` yields an empty task list and no-op mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerScope(Option<String>);

impl OwnerScope {
    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}
