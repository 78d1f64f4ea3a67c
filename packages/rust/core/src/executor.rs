//! Generic stage execution loop.
//!
//! A stage run is: fetch eligible records, claim each one conditionally,
//! invoke the stage handler, and write the outcome back. Handlers classify
//! their failures as transient (record stays eligible) or permanent
//! (record goes terminal for that stage). One record's failure never
//! aborts the batch; only record-store errors do, since without the store
//! there is nothing to write results to.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use pressgang_shared::{FailureKind, PressgangError, Record, Result, Stage, StageError};
use pressgang_storage::{StageUpdate, Store};

/// Failure reasons kept verbatim in a stage report.
const FAILURE_SAMPLE_SIZE: usize = 5;

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// A classified failure from a stage handler.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    /// Network-ish failure: retried on the next run.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Bad-input failure: the record goes terminal for this stage.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

/// Outcome of a single handler invocation.
pub type HandlerResult = std::result::Result<StageUpdate, StageFailure>;

/// A per-record stage implementation plugged into the executor.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler owns.
    fn stage(&self) -> Stage;

    /// Process one claimed record.
    async fn run(&self, record: &Record) -> HandlerResult;
}

// ---------------------------------------------------------------------------
// Stage report
// ---------------------------------------------------------------------------

/// Counts and sampled failure reasons from one stage run.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    /// Records claimed and run.
    pub attempted: usize,
    pub succeeded: usize,
    /// Transient failures: eligible again on the next run.
    pub transient: usize,
    /// Permanent failures: terminal for this stage.
    pub permanent: usize,
    /// Records lost to a concurrent runner's claim.
    pub contended: usize,
    /// Up to [`FAILURE_SAMPLE_SIZE`] of `(key, reason)` pairs.
    pub failures: Vec<(String, String)>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            succeeded: 0,
            transient: 0,
            permanent: 0,
            contended: 0,
            failures: Vec::new(),
        }
    }

    /// One-line human summary for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} retry-pending, {} failed ({} attempted, {} contended)",
            self.stage, self.succeeded, self.transient, self.permanent, self.attempted,
            self.contended
        )
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run one batch of a stage.
#[instrument(skip_all, fields(stage = %handler.stage(), limit = limit))]
pub async fn run_stage(
    store: &Store,
    handler: &dyn StageHandler,
    limit: u32,
) -> Result<StageReport> {
    let stage = handler.stage();
    let records = store.fetch_pending(stage, limit).await?;
    info!(eligible = records.len(), "stage batch starting");

    let mut report = StageReport::new(stage);

    for record in records {
        // Conditional claim: lose gracefully if another runner got here
        // between our fetch and now.
        if !store
            .claim(&record.id, record.last_attempted_at, Utc::now())
            .await?
        {
            report.contended += 1;
            continue;
        }

        report.attempted += 1;
        execute_one(store, handler, &record, &mut report).await?;
    }

    info!(
        succeeded = report.succeeded,
        transient = report.transient,
        permanent = report.permanent,
        "stage batch finished"
    );
    Ok(report)
}

/// Run a stage against exactly one record, addressed by key.
///
/// Used by the CLI's `--single` flag. Unlike batch runs this reports
/// ineligibility as an error, since the caller named the record.
pub async fn run_single(store: &Store, handler: &dyn StageHandler, key: &str) -> Result<StageReport> {
    let stage = handler.stage();
    let record = store
        .get_by_key(key)
        .await?
        .ok_or_else(|| PressgangError::validation(format!("no record with key {key}")))?;

    if !record.eligible_for(stage) {
        return Err(PressgangError::validation(format!(
            "record {key} is not eligible for {stage}: status {:?}, prerequisite unmet or already done",
            record.status_for(stage)
        )));
    }

    if !store
        .claim(&record.id, record.last_attempted_at, Utc::now())
        .await?
    {
        return Err(PressgangError::validation(format!(
            "record {key} was claimed by another runner"
        )));
    }

    let mut report = StageReport::new(stage);
    report.attempted = 1;
    execute_one(store, handler, &record, &mut report).await?;
    Ok(report)
}

/// Invoke the handler for a claimed record and write back the outcome.
async fn execute_one(
    store: &Store,
    handler: &dyn StageHandler,
    record: &Record,
    report: &mut StageReport,
) -> Result<()> {
    let stage = handler.stage();

    match handler.run(record).await {
        Ok(update) => {
            debug_assert_eq!(update.stage(), stage, "handler returned foreign update");
            store.apply_stage_success(&record.id, &update).await?;
            info!(key = %record.key, "record advanced");
            report.succeeded += 1;
        }
        Err(failure) => {
            warn!(
                key = %record.key,
                kind = ?failure.kind,
                reason = %failure.message,
                "record failed"
            );
            let error = StageError::new(stage, failure.kind, failure.message.clone());
            store.record_stage_failure(&record.id, &error).await?;

            match failure.kind {
                FailureKind::Transient => report.transient += 1,
                FailureKind::Permanent => report.permanent += 1,
            }
            if report.failures.len() < FAILURE_SAMPLE_SIZE {
                report.failures.push((record.key.clone(), failure.message));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressgang_shared::{SeedCandidate, StageStatus, slugify};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("pg_exec_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    async fn seed(store: &Store, subject: &str) -> String {
        store
            .upsert_seed(&SeedCandidate {
                subject: subject.into(),
                key: slugify(subject),
                category: None,
                tags: vec![],
            })
            .await
            .expect("seed")
    }

    /// Handler whose outcome is scripted per record key.
    struct ScriptedHandler {
        outcomes: Mutex<HashMap<String, HandlerResult>>,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(outcomes: Vec<(&str, HandlerResult)>) -> Self {
            Self {
                outcomes: Mutex::new(
                    outcomes
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StageHandler for ScriptedHandler {
        fn stage(&self) -> Stage {
            Stage::Acquire
        }

        async fn run(&self, record: &Record) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .remove(&record.key)
                .unwrap_or_else(|| Err(StageFailure::transient("unscripted record")))
        }
    }

    fn ok_update() -> HandlerResult {
        Ok(StageUpdate::RawArtifact("raw-documents/x.pdf".into()))
    }

    #[tokio::test]
    async fn success_writes_output_and_flag() {
        let store = test_store().await;
        seed(&store, "topic one").await;

        let handler = ScriptedHandler::new(vec![("topic-one", ok_update())]);
        let report = run_stage(&store, &handler, 10).await.expect("run");

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        let record = store.get_by_key("topic-one").await.unwrap().unwrap();
        assert_eq!(record.acquire_status, StageStatus::Done);
        assert_eq!(record.raw_artifact_ref.as_deref(), Some("raw-documents/x.pdf"));
        assert!(record.last_attempted_at.is_some());
    }

    #[tokio::test]
    async fn one_failure_never_aborts_the_batch() {
        let store = test_store().await;
        seed(&store, "good topic").await;
        seed(&store, "broken topic").await;
        seed(&store, "flaky topic").await;

        let handler = ScriptedHandler::new(vec![
            ("good-topic", ok_update()),
            ("broken-topic", Err(StageFailure::permanent("no source found"))),
            ("flaky-topic", Err(StageFailure::transient("timeout"))),
        ]);
        let report = run_stage(&store, &handler, 10).await.expect("run");

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.permanent, 1);
        assert_eq!(report.transient, 1);
        assert_eq!(report.failures.len(), 2);

        let broken = store.get_by_key("broken-topic").await.unwrap().unwrap();
        assert_eq!(broken.acquire_status, StageStatus::Failed);
        let flaky = store.get_by_key("flaky-topic").await.unwrap().unwrap();
        assert_eq!(flaky.acquire_status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn transient_records_are_retried_next_run() {
        let store = test_store().await;
        seed(&store, "retry me").await;

        let first = ScriptedHandler::new(vec![("retry-me", Err(StageFailure::transient("503")))]);
        run_stage(&store, &first, 10).await.expect("first run");

        let second = ScriptedHandler::new(vec![("retry-me", ok_update())]);
        let report = run_stage(&store, &second, 10).await.expect("second run");
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn permanent_records_are_not_refetched() {
        let store = test_store().await;
        seed(&store, "dead topic").await;

        let first =
            ScriptedHandler::new(vec![("dead-topic", Err(StageFailure::permanent("bad input")))]);
        run_stage(&store, &first, 10).await.expect("first run");

        let second = ScriptedHandler::new(vec![]);
        let report = run_stage(&store, &second, 10).await.expect("second run");
        assert_eq!(report.attempted, 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn batch_limit_is_respected() {
        let store = test_store().await;
        for i in 0..5 {
            seed(&store, &format!("topic number {i}")).await;
        }

        let handler = ScriptedHandler {
            outcomes: Mutex::new(
                (0..5)
                    .map(|i| (format!("topic-number-{i}"), ok_update()))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        };
        let report = run_stage(&store, &handler, 2).await.expect("run");
        assert_eq!(report.attempted, 2);
    }

    #[tokio::test]
    async fn single_run_requires_eligibility() {
        let store = test_store().await;
        let id = seed(&store, "single topic").await;

        let handler = ScriptedHandler::new(vec![("single-topic", ok_update())]);
        let report = run_single(&store, &handler, "single-topic").await.expect("single");
        assert_eq!(report.succeeded, 1);

        // Already done: naming it again is an error, not a silent no-op.
        let handler = ScriptedHandler::new(vec![("single-topic", ok_update())]);
        let err = run_single(&store, &handler, "single-topic").await.unwrap_err();
        assert!(err.to_string().contains("not eligible"));

        // Unknown key is reported distinctly.
        let err = run_single(&store, &handler, "missing-key").await.unwrap_err();
        assert!(err.to_string().contains("no record"));

        let record = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.acquire_status, StageStatus::Done);
    }

    #[test]
    fn report_summary_reads_well() {
        let mut report = StageReport::new(Stage::Extract);
        report.attempted = 4;
        report.succeeded = 2;
        report.transient = 1;
        report.permanent = 1;
        assert_eq!(
            report.summary(),
            "extract: 2 succeeded, 1 retry-pending, 1 failed (4 attempted, 0 contended)"
        );
    }
}
