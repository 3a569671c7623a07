//! libSQL run ledger and undelivered-post outbox (offline, single file).
//!
//! The [`Storage`] struct records every workflow run and keeps blog posts whose
//! spreadsheet append failed, so the next run can deliver them first.
//!
//! **Access rules:**
//! - Scheduler process: read-write via [`Storage::open`]
//! - `history` command: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use blogsmith_shared::{BlogsmithError, Result, RunId, RunState};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One row of the run ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub error: Option<String>,
    /// Leading characters of the blog post, when one was generated.
    pub preview: Option<String>,
}

/// A generated post still waiting to reach the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct UndeliveredPost {
    pub id: String,
    pub run_id: RunId,
    pub content: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    /// Redelivery attempts made so far.
    pub attempts: u32,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BlogsmithError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BlogsmithError::Storage(format!(
                "no run database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BlogsmithError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BlogsmithError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, id: RunId, started_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at, state) VALUES (?1, ?2, ?3)",
                params![
                    id.to_string(),
                    started_at.to_rfc3339(),
                    RunState::Idle.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Record the terminal state of a run.
    pub async fn finish_run(
        &self,
        id: RunId,
        state: RunState,
        error: Option<&str>,
        preview: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET finished_at = ?1, state = ?2, error = ?3, preview = ?4
                 WHERE id = ?5",
                params![now, state.as_str(), error, preview, id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(BlogsmithError::Storage(format!("unknown run {id}")));
        }
        Ok(())
    }

    /// Fetch one run by ID.
    pub async fn get_run(&self, id: RunId) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, state, error, preview
                 FROM runs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, state, error, preview
                 FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Undelivered-post outbox
    // -----------------------------------------------------------------------

    /// Queue `content` for redelivery. Returns `false` when an identical post
    /// is already pending.
    pub async fn enqueue_undelivered(&self, run_id: RunId, content: &str) -> Result<bool> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let hash = content_hash(content);
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO undelivered_posts
                     (id, run_id, content, content_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, run_id.to_string(), content, hash, now],
            )
            .await
            .map_err(storage_err)?;
        Ok(inserted > 0)
    }

    /// Posts not yet delivered, oldest first.
    pub async fn pending_posts(&self) -> Result<Vec<UndeliveredPost>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, run_id, content, content_hash, created_at, attempts
                 FROM undelivered_posts
                 WHERE delivered_at IS NULL
                 ORDER BY created_at, rowid",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }

    /// Count a failed redelivery attempt.
    pub async fn record_delivery_attempt(&self, post_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE undelivered_posts SET attempts = attempts + 1 WHERE id = ?1",
                params![post_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark a queued post as appended to the spreadsheet.
    pub async fn mark_delivered(&self, post_id: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE undelivered_posts
                 SET delivered_at = ?1, attempts = attempts + 1
                 WHERE id = ?2",
                params![now, post_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

/// Hex SHA-256 of a post body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn storage_err(e: libsql::Error) -> BlogsmithError {
    BlogsmithError::Storage(e.to_string())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BlogsmithError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_run_id(s: &str) -> Result<RunId> {
    s.parse()
        .map_err(|e| BlogsmithError::Storage(format!("invalid run id '{s}': {e}")))
}

fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    let started_at: String = row.get(1).map_err(storage_err)?;
    let state: String = row.get(3).map_err(storage_err)?;
    Ok(RunRecord {
        id: parse_run_id(&id)?,
        started_at: parse_time(&started_at)?,
        finished_at: match row.get::<String>(2).ok() {
            Some(s) => Some(parse_time(&s)?),
            None => None,
        },
        state: state
            .parse()
            .map_err(|e: BlogsmithError| BlogsmithError::Storage(e.to_string()))?,
        error: row.get::<String>(4).ok(),
        preview: row.get::<String>(5).ok(),
    })
}

fn row_to_post(row: &libsql::Row) -> Result<UndeliveredPost> {
    let run_id: String = row.get(1).map_err(storage_err)?;
    let created_at: String = row.get(4).map_err(storage_err)?;
    Ok(UndeliveredPost {
        id: row.get(0).map_err(storage_err)?,
        run_id: parse_run_id(&run_id)?,
        content: row.get(2).map_err(storage_err)?,
        content_hash: row.get(3).map_err(storage_err)?,
        created_at: parse_time(&created_at)?,
        attempts: row.get::<u32>(5).unwrap_or(0),
    })
}
