//! Integration tests for the store adapter boundary and the
//! reconciliation driver, exercised through the `TaskStore` trait the
//! way the service and plan runner consume it.

use backlogg::db::Database;
use backlogg::optimizer::optimize;
use backlogg::reconcile::reconcile;
use backlogg::service::MutationService;
use backlogg::store::{TaskStore, subscribe};
use backlogg::types::{NewTask, OwnerScope, Task, TaskStatus};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn fields(title: &str, status: TaskStatus) -> NewTask {
    NewTask {
        title: title.to_string(),
        duration: 0,
        start_time: None,
        deadline: None,
        status,
        subtasks: vec![],
    }
}

fn mid_hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 20, 0).unwrap()
}

mod adapter_tests {
    use super::*;

    #[tokio::test]
    async fn trait_crud_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let store: &dyn TaskStore = &db;

        let created = store
            .create_task("alice", fields("via trait", TaskStatus::Upcoming))
            .await
            .unwrap();

        let found = store.get_task(&created.id).await.unwrap().unwrap();
        assert_eq!(found, created);

        assert!(store.remove_task(&created.id).await.unwrap());
        assert!(store.get_task(&created.id).await.unwrap().is_none());
        assert!(!store.remove_task(&created.id).await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_task("alice", fields("durable", TaskStatus::Backlog))
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let tasks = db.list_tasks("alice").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "durable");
        assert_eq!(tasks[0].status, TaskStatus::Backlog);
    }

    #[tokio::test]
    async fn resubscribing_yields_a_fresh_snapshot() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = OwnerScope::user("alice");

        let mut feed = subscribe(Arc::clone(&db), owner.clone());
        assert!(feed.next().await.unwrap().unwrap().is_empty());
        drop(feed);

        // Writes that happened while nobody was listening show up in
        // the fresh subscription's initial snapshot.
        db.create_task("alice", fields("while away", TaskStatus::Upcoming))
            .unwrap();

        let mut feed = subscribe(Arc::clone(&db), owner);
        let snapshot = feed.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "while away");
    }
}

mod reconcile_tests {
    use super::*;

    async fn seeded(
        db: &Arc<Database>,
    ) -> (MutationService<Database>, Vec<Task>) {
        let service = MutationService::new(Arc::clone(db), OwnerScope::user("alice"));
        db.create_task(
            "alice",
            NewTask {
                title: "overdue".into(),
                duration: 60,
                start_time: Some(mid_hour() - Duration::hours(2)),
                deadline: None,
                status: TaskStatus::Ongoing,
                subtasks: vec![],
            },
        )
        .unwrap();
        db.create_task("alice", fields("steady", TaskStatus::Done))
            .unwrap();
        let snapshot = db.list_tasks("alice").unwrap();
        (service, snapshot)
    }

    #[tokio::test]
    async fn updates_exactly_the_changed_id_set() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (service, before) = seeded(&db).await;

        let after = optimize(&before, mid_hour());
        let changed: Vec<String> = before
            .iter()
            .zip(after.iter())
            .filter(|(b, a)| b.status != a.status || b.start_time != a.start_time)
            .map(|(b, _)| b.id.clone())
            .collect();

        let report = reconcile(&before, &after, &service).await;

        assert_eq!(report.updated, changed);
        assert!(report.is_clean());

        // Persisted state now matches the proposal on both fields.
        for proposed in &after {
            let live = db.get_task(&proposed.id).unwrap().unwrap();
            assert_eq!(live.status, proposed.status);
            assert_eq!(live.start_time, proposed.start_time);
        }
    }

    #[tokio::test]
    async fn unmatched_proposed_task_is_skipped_and_recorded() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (service, before) = seeded(&db).await;

        let mut after = optimize(&before, mid_hour());
        let mut orphan = after[0].clone();
        orphan.id = "not-in-before".into();
        after.push(orphan);

        let report = reconcile(&before, &after, &service).await;

        assert_eq!(report.skipped, vec!["not-in-before".to_string()]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn task_deleted_mid_pass_is_recorded_not_fatal() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (service, before) = seeded(&db).await;
        let after = optimize(&before, mid_hour());

        // The changed task disappears between optimization and write.
        let changed_id = after
            .iter()
            .zip(before.iter())
            .find(|(a, b)| a.status != b.status)
            .map(|(a, _)| a.id.clone())
            .unwrap();
        db.remove_task(&changed_id).unwrap();

        let report = reconcile(&before, &after, &service).await;

        assert_eq!(report.missing, vec![changed_id]);
        assert!(report.updated.is_empty());
        assert!(report.failures.is_empty());
    }
}
