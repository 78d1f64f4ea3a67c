//! libSQL record store adapter and filesystem blob store.
//!
//! The [`Store`] struct wraps the shared records table. All writes are
//! field-scoped single statements: a stage's success write sets its output
//! column and status flag together, so the two can never disagree, and an
//! interrupted batch leaves no half-written record.

mod blob;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use pressgang_shared::{
    ContentFacts, FailureKind, PressgangError, Record, RecordId, Result, SeedCandidate, Stage,
    StageError, StageStatus,
};

pub use blob::{BlobStore, RAW_BUCKET, REPORT_BUCKET};

/// Primary record store handle wrapping a libSQL database.
pub struct Store {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

// ---------------------------------------------------------------------------
// StageUpdate
// ---------------------------------------------------------------------------

/// The output a successful stage handler writes back.
///
/// Each variant carries exactly the output field owned by its stage; the
/// stage flag is derived from the variant, which is what makes the
/// "status done iff output non-null" invariant hold by construction.
#[derive(Debug, Clone)]
pub enum StageUpdate {
    RawArtifact(String),
    Facts(ContentFacts),
    FinalContent(String),
    ArtifactUrl(String),
}

impl StageUpdate {
    /// The stage that owns this update's output field.
    pub fn stage(&self) -> Stage {
        match self {
            Self::RawArtifact(_) => Stage::Acquire,
            Self::Facts(_) => Stage::Extract,
            Self::FinalContent(_) => Stage::Synthesize,
            Self::ArtifactUrl(_) => Stage::Package,
        }
    }
}

// ---------------------------------------------------------------------------
// StageCounts
// ---------------------------------------------------------------------------

/// Aggregate per-stage progress, used by the `status` report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub total: u64,
    pub done: [u64; 4],
    pub failed: [u64; 4],
}

impl StageCounts {
    /// Done count for a stage.
    pub fn done_for(&self, stage: Stage) -> u64 {
        self.done[stage_index(stage)]
    }

    /// Failed-terminal count for a stage.
    pub fn failed_for(&self, stage: Stage) -> u64 {
        self.failed[stage_index(stage)]
    }
}

fn stage_index(stage: Stage) -> usize {
    match stage {
        Stage::Acquire => 0,
        Stage::Extract => 1,
        Stage::Synthesize => 2,
        Stage::Package => 3,
    }
}

/// Status column name for a stage.
fn status_column(stage: Stage) -> &'static str {
    match stage {
        Stage::Acquire => "acquire_status",
        Stage::Extract => "extract_status",
        Stage::Synthesize => "synthesize_status",
        Stage::Package => "package_status",
    }
}

/// Output column name for a stage.
fn output_column(stage: Stage) -> &'static str {
    match stage {
        Stage::Acquire => "raw_artifact_ref",
        Stage::Extract => "facts_json",
        Stage::Synthesize => "final_content",
        Stage::Package => "artifact_url",
    }
}

const RECORD_COLUMNS: &str = "id, key, subject, category, tags_json, \
     acquire_status, extract_status, synthesize_status, package_status, \
     raw_artifact_ref, facts_json, final_content, artifact_url, \
     last_error_json, last_attempted_at, created_at, updated_at";

impl Store {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PressgangError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
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
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PressgangError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Discovery writes
    // -----------------------------------------------------------------------

    /// Upsert a discovered candidate, keyed by its slug.
    ///
    /// Repeated discovery of the same subject collapses into one record:
    /// on conflict only classification metadata is refreshed, and only
    /// where the existing record has none. Downstream columns are never
    /// touched. Returns the record id.
    pub async fn upsert_seed(&self, candidate: &SeedCandidate) -> Result<String> {
        let id = RecordId::new().to_string();
        let now = Utc::now().to_rfc3339();
        let tags_json = serde_json::to_string(&candidate.tags)
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO records (id, key, subject, category, tags_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(key) DO UPDATE SET
                   category = COALESCE(records.category, excluded.category),
                   tags_json = CASE WHEN records.tags_json = '[]'
                                    THEN excluded.tags_json
                                    ELSE records.tags_json END,
                   updated_at = excluded.updated_at",
                params![
                    id.as_str(),
                    candidate.key.as_str(),
                    candidate.subject.as_str(),
                    candidate.category.as_deref(),
                    tags_json.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        // The insert id loses to an existing row on conflict; read back the
        // canonical one.
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM records WHERE key = ?1",
                params![candidate.key.as_str()],
            )
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| PressgangError::Storage(e.to_string())),
            _ => Err(PressgangError::Storage(format!(
                "upserted record not found for key {}",
                candidate.key
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Get a record by its unique key.
    pub async fn get_by_key(&self, key: &str) -> Result<Option<Record>> {
        self.query_one(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE key = ?1"),
            key,
        )
        .await
    }

    /// Get a record by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        self.query_one(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
            id,
        )
        .await
    }

    async fn query_one(&self, sql: &str, arg: &str) -> Result<Option<Record>> {
        let mut rows = self
            .conn
            .query(sql, params![arg])
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PressgangError::Storage(e.to_string())),
        }
    }

    /// Fetch records eligible for a stage: stage pending, prerequisite done.
    ///
    /// Ordered oldest `last_attempted_at` first with never-attempted rows
    /// ahead of everything, so stale records are not starved by fresh ones.
    pub async fn fetch_pending(&self, stage: Stage, limit: u32) -> Result<Vec<Record>> {
        let mut predicate = format!("{} = 0", status_column(stage));
        if let Some(prev) = stage.prerequisite() {
            predicate.push_str(&format!(" AND {} = 1", status_column(prev)));
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE {predicate}
             ORDER BY last_attempted_at IS NOT NULL, last_attempted_at ASC, created_at ASC
             LIMIT ?1"
        );

        let mut rows = self
            .conn
            .query(&sql, params![limit])
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// List records whose content is terminal (synthesis done), newest first.
    ///
    /// Read-only input for manifest regeneration.
    pub async fn list_published(&self) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE synthesize_status = 1
             ORDER BY updated_at DESC"
        );

        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Aggregate stage progress across all records.
    pub async fn stage_counts(&self) -> Result<StageCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        SUM(acquire_status = 1), SUM(acquire_status = 2),
                        SUM(extract_status = 1), SUM(extract_status = 2),
                        SUM(synthesize_status = 1), SUM(synthesize_status = 2),
                        SUM(package_status = 1), SUM(package_status = 2)
                 FROM records",
                params![],
            )
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            _ => return Ok(StageCounts::default()),
        };

        let at = |i: i32| row.get::<i64>(i).unwrap_or(0).max(0) as u64;
        Ok(StageCounts {
            total: at(0),
            done: [at(1), at(3), at(5), at(7)],
            failed: [at(2), at(4), at(6), at(8)],
        })
    }

    // -----------------------------------------------------------------------
    // Stage writes
    // -----------------------------------------------------------------------

    /// Conditionally claim a record for processing.
    ///
    /// Succeeds only if `last_attempted_at` still holds the value observed
    /// at fetch time, so two batch drivers racing on the same stage cannot
    /// both win a record. Returns whether this caller won the claim.
    pub async fn claim(
        &self,
        id: &str,
        observed_attempt: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE records
                 SET last_attempted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND last_attempted_at IS ?3",
                params![
                    now.to_rfc3339(),
                    id,
                    observed_attempt.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;

        Ok(changed == 1)
    }

    /// Apply a successful stage result: output column, done flag, and
    /// `last_error` clear in one statement.
    pub async fn apply_stage_success(&self, id: &str, update: &StageUpdate) -> Result<()> {
        let stage = update.stage();
        let value: String = match update {
            StageUpdate::RawArtifact(v)
            | StageUpdate::FinalContent(v)
            | StageUpdate::ArtifactUrl(v) => v.clone(),
            StageUpdate::Facts(facts) => serde_json::to_string(facts)
                .map_err(|e| PressgangError::Storage(e.to_string()))?,
        };

        let sql = format!(
            "UPDATE records
             SET {output} = ?2, {status} = 1, last_error_json = NULL, updated_at = ?3
             WHERE id = ?1",
            output = output_column(stage),
            status = status_column(stage),
        );

        self.conn
            .execute(
                &sql,
                params![id, value.as_str(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record a stage failure.
    ///
    /// Transient failures only overwrite `last_error`: the record stays
    /// eligible for the next run. Permanent failures also flip the stage
    /// flag to failed-terminal, removing the record from future batches.
    pub async fn record_stage_failure(&self, id: &str, error: &StageError) -> Result<()> {
        let error_json = serde_json::to_string(error)
            .map_err(|e| PressgangError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        match error.kind {
            FailureKind::Transient => {
                self.conn
                    .execute(
                        "UPDATE records SET last_error_json = ?2, updated_at = ?3 WHERE id = ?1",
                        params![id, error_json.as_str(), now.as_str()],
                    )
                    .await
                    .map_err(|e| PressgangError::Storage(e.to_string()))?;
            }
            FailureKind::Permanent => {
                let sql = format!(
                    "UPDATE records
                     SET {status} = 2, last_error_json = ?2, updated_at = ?3
                     WHERE id = ?1",
                    status = status_column(error.stage),
                );
                self.conn
                    .execute(&sql, params![id, error_json.as_str(), now.as_str()])
                    .await
                    .map_err(|e| PressgangError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Reset a terminal-failed stage back to pending for manual retry.
    pub async fn reset_stage(&self, key: &str, stage: Stage) -> Result<bool> {
        let sql = format!(
            "UPDATE records
             SET {status} = 0, last_error_json = NULL, updated_at = ?2
             WHERE key = ?1 AND {status} = 2",
            status = status_column(stage),
        );
        let changed = self
            .conn
            .execute(&sql, params![key, Utc::now().to_rfc3339()])
            .await
            .map_err(|e| PressgangError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Convert a database row (in `RECORD_COLUMNS` order) to a [`Record`].
fn row_to_record(row: &libsql::Row) -> Result<Record> {
    let get_str = |i: i32| -> Result<String> {
        row.get::<String>(i)
            .map_err(|e| PressgangError::Storage(e.to_string()))
    };
    let get_status = |i: i32| -> Result<StageStatus> {
        let v = row
            .get::<i64>(i)
            .map_err(|e| PressgangError::Storage(e.to_string()))?;
        StageStatus::from_i64(v)
            .ok_or_else(|| PressgangError::Storage(format!("invalid stage status {v}")))
    };
    let parse_time = |s: String| -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PressgangError::Storage(format!("invalid date: {e}")))
    };

    let tags: Vec<String> = serde_json::from_str(&get_str(4)?)
        .map_err(|e| PressgangError::Storage(format!("invalid tags_json: {e}")))?;

    let facts: Option<ContentFacts> = match row.get::<String>(10).ok() {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| PressgangError::Storage(format!("invalid facts_json: {e}")))?,
        ),
        None => None,
    };

    let last_error: Option<StageError> = match row.get::<String>(13).ok() {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| PressgangError::Storage(format!("invalid last_error_json: {e}")))?,
        ),
        None => None,
    };

    Ok(Record {
        id: get_str(0)?,
        key: get_str(1)?,
        subject: get_str(2)?,
        category: row.get::<String>(3).ok(),
        tags,
        acquire_status: get_status(5)?,
        extract_status: get_status(6)?,
        synthesize_status: get_status(7)?,
        package_status: get_status(8)?,
        raw_artifact_ref: row.get::<String>(9).ok(),
        facts,
        final_content: row.get::<String>(11).ok(),
        artifact_url: row.get::<String>(12).ok(),
        last_error,
        last_attempted_at: match row.get::<String>(14).ok() {
            Some(s) => Some(parse_time(s)?),
            None => None,
        },
        created_at: parse_time(get_str(15)?)?,
        updated_at: parse_time(get_str(16)?)?,
    })
}
