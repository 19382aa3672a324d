//! Task CRUD, owner-scoped.

use super::{Database, datetime_from_ms, datetime_to_ms, now_ms};
use crate::error::{StoreError, StoreResult};
use crate::store::{ChangeKind, StoreEvent};
use crate::types::{NewTask, Subtask, Task, TaskPatch, TaskStatus};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params, params_from_iter};
use uuid::Uuid;

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let id: String = row.get("id")?;
    let title: String = row.get("title")?;
    let duration: i64 = row.get("duration")?;
    let start_time: Option<i64> = row.get("start_time")?;
    let deadline: Option<i64> = row.get("deadline")?;
    let status: String = row.get("status")?;
    let subtasks_json: String = row.get("subtasks")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    let subtasks: Vec<Subtask> = serde_json::from_str(&subtasks_json).unwrap_or_default();

    Ok(Task {
        id,
        title,
        duration: u32::try_from(duration).unwrap_or(0),
        start_time: datetime_from_ms(start_time),
        deadline: datetime_from_ms(deadline),
        status: TaskStatus::from_str(&status).unwrap_or(TaskStatus::Backlog),
        subtasks,
        created_at: datetime_from_ms(Some(created_at)).unwrap_or_default(),
        updated_at: datetime_from_ms(Some(updated_at)).unwrap_or_default(),
    })
}

/// Internal helper to get a task using an existing connection.
fn get_task_internal(conn: &Connection, task_id: &str) -> StoreResult<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;

    let result = stmt.query_row(params![task_id], parse_task_row);

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Internal helper to resolve a task's owner, if the task exists.
fn get_owner_internal(conn: &Connection, task_id: &str) -> StoreResult<Option<String>> {
    let result = conn.query_row(
        "SELECT owner_id FROM tasks WHERE id = ?1",
        params![task_id],
        |row| row.get(0),
    );

    match result {
        Ok(owner) => Ok(Some(owner)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Database {
    /// Insert a new task owned by `owner_id`. The id is generated here
    /// (UUID7, so ids sort by creation time like the rest of the row).
    pub fn create_task(&self, owner_id: &str, fields: NewTask) -> StoreResult<Task> {
        let task_id = Uuid::now_v7().to_string();
        let now = now_ms();
        let subtasks_json = serde_json::to_string(&fields.subtasks)?;

        {
            let conn = self.conn_guard();
            conn.execute(
                "INSERT INTO tasks (
                    id, owner_id, title, duration, start_time, deadline, status, subtasks,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    &task_id,
                    owner_id,
                    &fields.title,
                    i64::from(fields.duration),
                    datetime_to_ms(fields.start_time),
                    datetime_to_ms(fields.deadline),
                    fields.status.as_str(),
                    subtasks_json,
                    now,
                    now,
                ],
            )?;
        }

        self.notify(StoreEvent {
            owner_id: owner_id.to_string(),
            kind: ChangeKind::Created,
        });

        let conn = self.conn_guard();
        get_task_internal(&conn, &task_id)?
            .ok_or_else(|| StoreError::internal("created task vanished before read-back"))
    }

    /// Point read of current task state.
    pub fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        let conn = self.conn_guard();
        get_task_internal(&conn, task_id)
    }

    /// Merge the supplied fields into the task document. Fields not
    /// present in the patch are left untouched. Returns false if the
    /// task does not exist.
    pub fn update_task(&self, task_id: &str, patch: &TaskPatch) -> StoreResult<bool> {
        let owner = {
            let conn = self.conn_guard();
            let Some(owner) = get_owner_internal(&conn, task_id)? else {
                return Ok(false);
            };

            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(title) = &patch.title {
                sets.push("title = ?");
                values.push(Box::new(title.clone()));
            }
            if let Some(status) = patch.status {
                sets.push("status = ?");
                values.push(Box::new(status.as_str()));
            }
            if let Some(start_time) = patch.start_time {
                sets.push("start_time = ?");
                values.push(Box::new(datetime_to_ms(start_time)));
            }
            if let Some(deadline) = patch.deadline {
                sets.push("deadline = ?");
                values.push(Box::new(datetime_to_ms(deadline)));
            }
            if let Some(subtasks) = &patch.subtasks {
                sets.push("subtasks = ?");
                values.push(Box::new(serde_json::to_string(subtasks)?));
            }

            if sets.is_empty() {
                return Ok(true);
            }

            sets.push("updated_at = ?");
            values.push(Box::new(now_ms()));
            values.push(Box::new(task_id.to_string()));

            let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
            conn.execute(&sql, params_from_iter(values))?;
            owner
        };

        self.notify(StoreEvent {
            owner_id: owner,
            kind: ChangeKind::Updated,
        });

        Ok(true)
    }

    /// Delete the task and its embedded subtasks. Returns false if the
    /// task does not exist.
    pub fn remove_task(&self, task_id: &str) -> StoreResult<bool> {
        let owner = {
            let conn = self.conn_guard();
            let Some(owner) = get_owner_internal(&conn, task_id)? else {
                return Ok(false);
            };
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            owner
        };

        self.notify(StoreEvent {
            owner_id: owner,
            kind: ChangeKind::Removed,
        });

        Ok(true)
    }

    /// All tasks owned by `owner_id`, in creation order. The list
    /// position is meaningful: the optimizer promotes the first Backlog
    /// task by this order.
    pub fn list_tasks(&self, owner_id: &str) -> StoreResult<Vec<Task>> {
        let conn = self.conn_guard();
        let mut stmt = conn
            .prepare("SELECT * FROM tasks WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC")?;

        let tasks = stmt
            .query_map(params![owner_id], parse_task_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    fn conn_guard(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTask;

    fn setup_db() -> Database {
        Database::open_in_memory().expect("Failed to create in-memory database")
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            duration: 0,
            start_time: None,
            deadline: None,
            status: TaskStatus::Upcoming,
            subtasks: vec![],
        }
    }

    #[test]
    fn created_task_reads_back_with_defaults() {
        let db = setup_db();

        let task = db.create_task("user-1", new_task("write report")).unwrap();

        assert_eq!(task.title, "write report");
        assert_eq!(task.status, TaskStatus::Upcoming);
        assert_eq!(task.duration, 0);
        assert!(task.subtasks.is_empty());

        let found = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(found, task);
    }

    #[test]
    fn list_is_scoped_by_owner_in_creation_order() {
        let db = setup_db();
        let a = db.create_task("alice", new_task("first")).unwrap();
        let b = db.create_task("alice", new_task("second")).unwrap();
        db.create_task("bob", new_task("other")).unwrap();

        let tasks = db.list_tasks("alice").unwrap();
        assert_eq!(
            tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec![a.id.as_str(), b.id.as_str()]
        );
    }

    #[test]
    fn update_merges_only_supplied_fields() {
        let db = setup_db();
        let task = db.create_task("alice", new_task("keep my title")).unwrap();

        let updated = db
            .update_task(
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::Ongoing),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated);

        let found = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(found.status, TaskStatus::Ongoing);
        assert_eq!(found.title, "keep my title");
    }

    #[test]
    fn update_can_clear_start_time() {
        let db = setup_db();
        let mut fields = new_task("scheduled");
        fields.start_time = Some(datetime_from_ms(Some(now_ms())).unwrap());
        let task = db.create_task("alice", fields).unwrap();
        assert!(task.start_time.is_some());

        db.update_task(
            &task.id,
            &TaskPatch {
                start_time: Some(None),
                ..Default::default()
            },
        )
        .unwrap();

        let found = db.get_task(&task.id).unwrap().unwrap();
        assert!(found.start_time.is_none());
    }

    #[test]
    fn update_unknown_task_reports_not_found() {
        let db = setup_db();
        let updated = db
            .update_task(
                "missing",
                &TaskPatch {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn remove_deletes_task_and_subtasks() {
        let db = setup_db();
        let mut fields = new_task("with subtasks");
        fields.subtasks = vec![Subtask {
            id: "s1".into(),
            title: "part one".into(),
            completed: false,
            date: None,
        }];
        let task = db.create_task("alice", fields).unwrap();

        assert!(db.remove_task(&task.id).unwrap());
        assert!(db.get_task(&task.id).unwrap().is_none());
        assert!(!db.remove_task(&task.id).unwrap());
    }
}
