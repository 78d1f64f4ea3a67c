//! Discovery: mine candidate subjects from a seed and upsert records.
//!
//! Candidates come from the suggestion client's bounded expansion. Each
//! one is slugified into its idempotence key and classified against a
//! fixed rule table, falling back to the seed's own classification when
//! no rule matches. Re-running with the same seed produces the same keys,
//! so repeats collapse into metadata refreshes.

use tracing::{info, instrument, warn};

use pressgang_providers::SuggestClient;
use pressgang_shared::{Result, SeedCandidate, slugify};
use pressgang_storage::Store;

/// Pattern → category rule table for candidate classification.
///
/// First matching substring wins; patterns are matched lower-case.
const CATEGORY_RULES: &[(&str, &str)] = &[
    ("nurs", "Nursing"),
    ("rn license", "Nursing"),
    ("teach", "Education"),
    ("cosmetolog", "Cosmetology"),
    ("barber", "Cosmetology"),
    ("electric", "Trades"),
    ("plumb", "Trades"),
    ("hvac", "Trades"),
    ("contractor", "Trades"),
    ("real estate", "Real Estate"),
    ("attorney", "Legal"),
    ("paralegal", "Legal"),
    ("bar exam", "Legal"),
    ("physician", "Medicine"),
    ("pharmac", "Pharmacy"),
    ("dental", "Dental"),
    ("therap", "Therapy"),
    ("social work", "Social Work"),
];

/// The seed a discovery run expands, with inheritable classification.
#[derive(Debug, Clone)]
pub struct SeedContext {
    pub subject: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Counts from one discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Candidates returned by suggestion expansion.
    pub candidates: usize,
    /// Candidates upserted into the record store.
    pub upserted: usize,
    /// Candidates dropped (empty slug or store rejection).
    pub skipped: usize,
}

/// Classify a candidate subject, inheriting from the seed on no match.
pub fn classify(subject: &str, seed: &SeedContext) -> (Option<String>, Vec<String>) {
    let lower = subject.to_lowercase();
    let category = CATEGORY_RULES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, category)| category.to_string())
        .or_else(|| seed.category.clone());

    (category, seed.tags.clone())
}

/// Run discovery for a seed: expand, classify, upsert.
#[instrument(skip_all, fields(seed = %seed.subject, depth = depth))]
pub async fn run_discovery(
    store: &Store,
    suggest: &SuggestClient,
    seed: &SeedContext,
    depth: u32,
) -> Result<DiscoveryReport> {
    let candidates = suggest.expand(&seed.subject, depth).await?;
    let mut report = DiscoveryReport {
        candidates: candidates.len(),
        ..DiscoveryReport::default()
    };

    for subject in candidates {
        let key = slugify(&subject);
        if key.is_empty() {
            report.skipped += 1;
            continue;
        }

        let (category, tags) = classify(&subject, seed);
        let candidate = SeedCandidate {
            subject,
            key,
            category,
            tags,
        };

        // A store rejection (e.g. constraint violation) skips the candidate
        // rather than aborting the run.
        match store.upsert_seed(&candidate).await {
            Ok(_) => report.upserted += 1,
            Err(e) => {
                warn!(key = %candidate.key, error = %e, "candidate upsert failed, skipping");
                report.skipped += 1;
            }
        }
    }

    info!(
        candidates = report.candidates,
        upserted = report.upserted,
        skipped = report.skipped,
        "discovery finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressgang_shared::DiscoveryConfig;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("pg_disc_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    fn seed() -> SeedContext {
        SeedContext {
            subject: "nursing license reciprocity".into(),
            category: Some("Licensing".into()),
            tags: vec!["reciprocity".into()],
        }
    }

    fn suggest_client(uri: String) -> SuggestClient {
        SuggestClient::new(&DiscoveryConfig {
            suggest_url: uri,
            expansion_depth: 0,
            level_delay_ms: 1,
            timeout_secs: 5,
        })
        .expect("client")
    }

    #[test]
    fn classify_matches_rule_table() {
        let s = seed();
        let (category, tags) = classify("Nursing license reciprocity texas", &s);
        assert_eq!(category.as_deref(), Some("Nursing"));
        assert_eq!(tags, vec!["reciprocity".to_string()]);

        let (category, _) = classify("real estate broker exam prep", &s);
        assert_eq!(category.as_deref(), Some("Real Estate"));
    }

    #[test]
    fn classify_falls_back_to_seed_context() {
        let s = seed();
        let (category, _) = classify("completely unrelated subject", &s);
        assert_eq!(category.as_deref(), Some("Licensing"));

        let bare = SeedContext {
            subject: "x".into(),
            category: None,
            tags: vec![],
        };
        let (category, tags) = classify("completely unrelated subject", &bare);
        assert_eq!(category, None);
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn repeated_discovery_creates_one_record_per_subject() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"["nursing license reciprocity", ["nursing license reciprocity texas", "nursing license reciprocity florida"]]"#,
            ))
            .mount(&server)
            .await;

        let store = test_store().await;
        let client = suggest_client(server.uri());
        let s = seed();

        // Discovery runs three times in a row.
        for _ in 0..3 {
            let report = run_discovery(&store, &client, &s, 0).await.expect("discover");
            assert_eq!(report.candidates, 2);
            assert_eq!(report.upserted, 2);
        }

        let counts = store.stage_counts().await.unwrap();
        assert_eq!(counts.total, 2);

        let record = store
            .get_by_key("nursing-license-reciprocity-texas")
            .await
            .unwrap()
            .expect("record created once");
        assert_eq!(record.subject, "nursing license reciprocity texas");
        assert_eq!(record.category.as_deref(), Some("Nursing"));
    }

    #[tokio::test]
    async fn unusable_candidates_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"["seed", ["???", "usable topic"]]"#),
            )
            .mount(&server)
            .await;

        let store = test_store().await;
        let report = run_discovery(&store, &suggest_client(server.uri()), &seed(), 0)
            .await
            .expect("discover");

        assert_eq!(report.candidates, 2);
        assert_eq!(report.upserted, 1);
        assert_eq!(report.skipped, 1);
    }
}
