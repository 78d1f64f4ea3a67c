//! SQL migration definitions for the pressgang record store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

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
        description: "Initial schema: records table with per-stage status columns",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pipeline records. One row per subject; never deleted.
-- Stage status columns: 0 = pending, 1 = done, 2 = failed-terminal.
CREATE TABLE IF NOT EXISTS records (
    id                TEXT PRIMARY KEY,
    key               TEXT NOT NULL UNIQUE,
    subject           TEXT NOT NULL,
    category          TEXT,
    tags_json         TEXT NOT NULL DEFAULT '[]',
    acquire_status    INTEGER NOT NULL DEFAULT 0,
    extract_status    INTEGER NOT NULL DEFAULT 0,
    synthesize_status INTEGER NOT NULL DEFAULT 0,
    package_status    INTEGER NOT NULL DEFAULT 0,
    raw_artifact_ref  TEXT,
    facts_json        TEXT,
    final_content     TEXT,
    artifact_url      TEXT,
    last_error_json   TEXT,
    last_attempted_at TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_acquire    ON records(acquire_status);
CREATE INDEX IF NOT EXISTS idx_records_extract    ON records(extract_status);
CREATE INDEX IF NOT EXISTS idx_records_synthesize ON records(synthesize_status);
CREATE INDEX IF NOT EXISTS idx_records_package    ON records(package_status);
CREATE INDEX IF NOT EXISTS idx_records_attempted  ON records(last_attempted_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
