//! SQL migration definitions for the Blogsmith run database.
//!
//! Migrations are applied in order on database open; each one records its
//! version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, undelivered_posts",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per workflow run
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    state       TEXT NOT NULL,
    error       TEXT,
    preview     TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);

-- Generated posts whose spreadsheet append failed
CREATE TABLE IF NOT EXISTS undelivered_posts (
    id           TEXT PRIMARY KEY,
    run_id       TEXT NOT NULL,
    content      TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    attempts     INTEGER NOT NULL DEFAULT 0,
    delivered_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_undelivered_pending
    ON undelivered_posts(delivered_at, created_at);

-- One pending copy per post; delivered rows do not block a new one
CREATE UNIQUE INDEX IF NOT EXISTS idx_undelivered_pending_hash
    ON undelivered_posts(content_hash) WHERE delivered_at IS NULL;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
