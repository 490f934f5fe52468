//! Last-run marker for the daily scheduler.
//!
//! The marker records the exchange-local date of the last daily screening
//! attempt. The SQLite implementation survives restarts, so a restart before
//! the trigger time on a day that already ran does not fire again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Persistence for the scheduler's last-run date.
#[async_trait]
pub trait RunMarker: Send + Sync {
    /// Date of the last recorded run, if any.
    async fn last_run(&self) -> Result<Option<NaiveDate>>;

    /// Record a run for `date`.
    async fn record_run(&self, date: NaiveDate) -> Result<()>;
}

// ============================================================================
// In-memory Marker
// ============================================================================

/// Process-lifetime marker; forgotten on restart.
#[derive(Default)]
pub struct MemoryRunMarker {
    last_run: Mutex<Option<NaiveDate>>,
}

impl MemoryRunMarker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunMarker for MemoryRunMarker {
    async fn last_run(&self) -> Result<Option<NaiveDate>> {
        Ok(*self.last_run.lock().await)
    }

    async fn record_run(&self, date: NaiveDate) -> Result<()> {
        *self.last_run.lock().await = Some(date);
        Ok(())
    }
}

// ============================================================================
// SQLite Marker
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scheduler_runs (
    job TEXT PRIMARY KEY,
    last_run_date TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// Job name under which the daily screening run is recorded.
const DAILY_SCREENING_JOB: &str = "daily_screening";

/// Marker stored in a SQLite file.
pub struct SqliteRunMarker {
    /// rusqlite::Connection is Send but not Sync
    db: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteRunMarker {
    /// Open (or create) the marker database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path).context("Failed to open scheduler marker database")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create scheduler marker tables")?;

        info!(db_path = %path.display(), "Initialized scheduler run marker");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RunMarker for SqliteRunMarker {
    async fn last_run(&self) -> Result<Option<NaiveDate>> {
        let db = self.db.lock().await;

        let result = db.query_row(
            "SELECT last_run_date FROM scheduler_runs WHERE job = ?1",
            params![DAILY_SCREENING_JOB],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(date) => {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("Corrupt last_run_date '{}'", date))?;
                Ok(Some(date))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_run(&self, date: NaiveDate) -> Result<()> {
        let db = self.db.lock().await;

        db.execute(
            r#"
            INSERT OR REPLACE INTO scheduler_runs (job, last_run_date, recorded_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![
                DAILY_SCREENING_JOB,
                date.format("%Y-%m-%d").to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to record scheduler run")?;

        Ok(())
    }
}
