//! SQLite-backed store for the Backlogg planner.

pub mod tasks;

use crate::store::StoreEvent;
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Capacity of the change-event channel. Receivers that fall behind see a
/// `Lagged` error and recover by re-querying a full snapshot.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent access
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::from_conn(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::from_conn(conn)
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            events,
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Exclusive access to the connection for the CRUD layer.
    pub(crate) fn conn_lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Subscribe to raw change events. Each event names the owner whose
    /// task set changed; the payload is intentionally not a delta.
    pub fn event_receiver(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Publish a change event. Send errors mean no live subscribers,
    /// which is fine.
    pub(crate) fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a stored millisecond timestamp into the in-process temporal
/// type. Out-of-range values (pre-1970 overflow artifacts) become `None`.
pub fn datetime_from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|v| Utc.timestamp_millis_opt(v).single())
}

/// Convert the in-process temporal type to store-native milliseconds.
pub fn datetime_to_ms(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(|v| v.timestamp_millis())
}
