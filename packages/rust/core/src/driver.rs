//! Batch driver: runs stages in strict dependency order.
//!
//! A single invocation may run one stage or several; the driver orders
//! them by the prerequisite chain so a record can flow through multiple
//! stages within one pass, and no stage ever sees a record whose
//! predecessor has not finished (the store predicate guarantees that per
//! record, the ordering guarantees it per pass).

use tracing::{info, instrument};

use pressgang_shared::{Result, Stage};
use pressgang_storage::Store;

use crate::executor::{StageHandler, StageReport, run_stage};

/// Run the given stage handlers in dependency order, one batch each.
///
/// Handlers may be passed in any order; duplicates are rejected by the
/// caller providing at most one handler per stage.
#[instrument(skip_all, fields(stages = handlers.len(), limit = limit))]
pub async fn run_stages(
    store: &Store,
    handlers: Vec<&dyn StageHandler>,
    limit: u32,
) -> Result<Vec<StageReport>> {
    let mut ordered = handlers;
    ordered.sort_by_key(|h| stage_position(h.stage()));

    let mut reports = Vec::with_capacity(ordered.len());
    for handler in ordered {
        let report = run_stage(store, handler, limit).await?;
        info!("{}", report.summary());
        reports.push(report);
    }
    Ok(reports)
}

fn stage_position(stage: Stage) -> usize {
    Stage::ALL
        .iter()
        .position(|s| *s == stage)
        .expect("stage present in ALL")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{HandlerResult, StageFailure};
    use async_trait::async_trait;
    use pressgang_shared::{ContentFacts, Record, SeedCandidate, StageStatus, slugify};
    use pressgang_storage::StageUpdate;
    use uuid::Uuid;

    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("pg_drv_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    /// Handler that always succeeds with its stage's canonical output.
    struct AlwaysOk(Stage);

    #[async_trait]
    impl StageHandler for AlwaysOk {
        fn stage(&self) -> Stage {
            self.0
        }

        async fn run(&self, _record: &Record) -> HandlerResult {
            Ok(match self.0 {
                Stage::Acquire => StageUpdate::RawArtifact("raw-documents/x.pdf".into()),
                Stage::Extract => StageUpdate::Facts(ContentFacts::default()),
                Stage::Synthesize => StageUpdate::FinalContent("<h1>Content</h1>".into()),
                Stage::Package => StageUpdate::ArtifactUrl("https://x/r.pdf".into()),
            })
        }
    }

    /// Handler that always fails transiently.
    struct AlwaysFails(Stage);

    #[async_trait]
    impl StageHandler for AlwaysFails {
        fn stage(&self) -> Stage {
            self.0
        }

        async fn run(&self, _record: &Record) -> HandlerResult {
            Err(StageFailure::transient("down"))
        }
    }

    #[tokio::test]
    async fn full_pass_flows_a_record_through_all_stages() {
        let store = test_store().await;
        store
            .upsert_seed(&SeedCandidate {
                subject: "full pass topic".into(),
                key: slugify("full pass topic"),
                category: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let acquire = AlwaysOk(Stage::Acquire);
        let extract = AlwaysOk(Stage::Extract);
        let synthesize = AlwaysOk(Stage::Synthesize);
        let package = AlwaysOk(Stage::Package);

        // Deliberately shuffled input order: the driver must sort.
        let reports = run_stages(
            &store,
            vec![&package, &extract, &acquire, &synthesize],
            10,
        )
        .await
        .expect("run");

        let stages: Vec<Stage> = reports.iter().map(|r| r.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert!(reports.iter().all(|r| r.succeeded == 1));

        let record = store.get_by_key("full-pass-topic").await.unwrap().unwrap();
        assert_eq!(record.package_status, StageStatus::Done);
        assert!(record.artifact_url.is_some());
    }

    #[tokio::test]
    async fn blocked_prerequisite_stops_later_stages_for_that_record() {
        let store = test_store().await;
        store
            .upsert_seed(&SeedCandidate {
                subject: "stuck topic".into(),
                key: slugify("stuck topic"),
                category: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let acquire = AlwaysFails(Stage::Acquire);
        let extract = AlwaysOk(Stage::Extract);

        let reports = run_stages(&store, vec![&acquire, &extract], 10)
            .await
            .expect("run");

        assert_eq!(reports[0].transient, 1);
        // Extract saw no eligible records: the chain held.
        assert_eq!(reports[1].attempted, 0);
    }
}
