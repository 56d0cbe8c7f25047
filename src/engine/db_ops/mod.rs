//! Checkpoint database: schema, open, snapshot save/load.

mod connection;
mod store;

pub use connection::{open_db, open_db_in_memory};
pub use store::{load_snapshot, save_snapshot};

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Bumped whenever the tables below change shape. Older checkpoints are discarded.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Schema for the checkpoint tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    fingerprint BLOB NOT NULL,
    produced_by INTEGER,
    produced_by_product INTEGER,
    state TEXT NOT NULL,
    dirty INTEGER NOT NULL,
    pass INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    source_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    input_path TEXT NOT NULL,
    builder_id TEXT NOT NULL,
    builder_version INTEGER NOT NULL,
    platform TEXT NOT NULL,
    intermediate INTEGER NOT NULL,
    auto_fail INTEGER NOT NULL,
    fail_reason TEXT,
    input_fingerprint BLOB NOT NULL,
    upstream TEXT NOT NULL,
    status TEXT NOT NULL,
    pass INTEGER NOT NULL,
    forced INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source_id);

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    job_id INTEGER NOT NULL,
    source_id TEXT NOT NULL,
    builder_id TEXT NOT NULL,
    path TEXT NOT NULL,
    platform TEXT NOT NULL,
    flags INTEGER NOT NULL,
    sub_id INTEGER NOT NULL,
    fingerprint BLOB NOT NULL,
    intermediate_source TEXT
);

CREATE TABLE IF NOT EXISTS fingerprints (
    source_id TEXT NOT NULL,
    builder_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    sub_id INTEGER NOT NULL,
    fingerprint BLOB NOT NULL,
    PRIMARY KEY (source_id, builder_id, platform, sub_id)
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;
