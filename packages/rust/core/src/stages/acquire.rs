//! Acquisition: find and download the official source document.
//!
//! Searches for a PDF handbook matching the record's subject, downloads
//! it with a bounded timeout, validates that the payload really is a PDF
//! (boards love serving HTML error pages with status 200), and stores it
//! in the raw-documents bucket under the record key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use pressgang_providers::{DocumentSearch, SearchHit};
use pressgang_shared::{PressgangError, Record, Result, Stage};
use pressgang_storage::{BlobStore, RAW_BUCKET, StageUpdate};

use crate::executor::{HandlerResult, StageFailure, StageHandler};

/// User-Agent string for document downloads.
const USER_AGENT: &str = concat!("pressgang/", env!("CARGO_PKG_VERSION"));

/// Acquisition stage handler.
pub struct AcquireHandler {
    search: Arc<dyn DocumentSearch>,
    blobs: BlobStore,
    client: reqwest::Client,
}

impl AcquireHandler {
    pub fn new(
        search: Arc<dyn DocumentSearch>,
        blobs: BlobStore,
        download_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(download_timeout)
            .build()
            .map_err(|e| PressgangError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            search,
            blobs,
            client,
        })
    }
}

/// Prefer hits whose URL looks like a PDF; fall back to the first hit.
fn pick_hit(hits: &[SearchHit]) -> Option<&SearchHit> {
    hits.iter()
        .find(|hit| hit.url.to_lowercase().contains(".pdf"))
        .or_else(|| hits.first())
}

/// Whether the response payload is plausibly a PDF.
fn looks_like_pdf(content_type: Option<&str>, bytes: &[u8]) -> bool {
    let header_says_pdf = content_type
        .map(|ct| ct.to_lowercase().contains("pdf"))
        .unwrap_or(false);
    header_says_pdf || bytes.starts_with(b"%PDF")
}

#[async_trait]
impl StageHandler for AcquireHandler {
    fn stage(&self) -> Stage {
        Stage::Acquire
    }

    async fn run(&self, record: &Record) -> HandlerResult {
        let query = format!("{} official handbook filetype:pdf", record.subject);
        let hits = self
            .search
            .search(&query)
            .await
            .map_err(|e| StageFailure::transient(format!("document search failed: {e}")))?;

        // An empty result set will not improve on retry: the subject has
        // no findable source document.
        let Some(hit) = pick_hit(&hits) else {
            return Err(StageFailure::permanent("no source document found"));
        };
        debug!(url = %hit.url, "downloading source document");

        let response = self
            .client
            .get(&hit.url)
            .send()
            .await
            .map_err(|e| StageFailure::transient(format!("download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageFailure::transient(format!(
                "download returned HTTP {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageFailure::transient(format!("download body read failed: {e}")))?;

        if !looks_like_pdf(content_type.as_deref(), &bytes) {
            return Err(StageFailure::permanent(format!(
                "wrong content type: expected a PDF, got {}",
                content_type.as_deref().unwrap_or("unknown")
            )));
        }

        let blob_ref = self
            .blobs
            .put(RAW_BUCKET, &format!("{}.pdf", record.key), &bytes)
            .map_err(|e| StageFailure::transient(format!("blob store write failed: {e}")))?;

        info!(key = %record.key, bytes = bytes.len(), "source document stored");
        Ok(StageUpdate::RawArtifact(blob_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pressgang_shared::{FailureKind, StageStatus};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSearch {
        hits: Vec<SearchHit>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentSearch for FixedSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            if self.fail {
                Err(PressgangError::Network("search endpoint down".into()))
            } else {
                Ok(self.hits.clone())
            }
        }
    }

    fn test_blobs() -> BlobStore {
        let root = std::env::temp_dir().join(format!("pg_acq_{}", Uuid::now_v7()));
        BlobStore::new(root, "https://files.example.com")
    }

    fn record() -> Record {
        let now = Utc::now();
        Record {
            id: Uuid::now_v7().to_string(),
            key: "nursing-license-reciprocity-texas".into(),
            subject: "nursing license reciprocity texas".into(),
            category: None,
            tags: vec![],
            acquire_status: StageStatus::Pending,
            extract_status: StageStatus::Pending,
            synthesize_status: StageStatus::Pending,
            package_status: StageStatus::Pending,
            raw_artifact_ref: None,
            facts: None,
            final_content: None,
            artifact_url: None,
            last_error: None,
            last_attempted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn handler(hits: Vec<SearchHit>, fail: bool) -> (AcquireHandler, BlobStore) {
        let blobs = test_blobs();
        let handler = AcquireHandler::new(
            Arc::new(FixedSearch { hits, fail }),
            blobs.clone(),
            Duration::from_secs(5),
        )
        .expect("handler");
        (handler, blobs)
    }

    #[tokio::test]
    async fn downloads_and_stores_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/handbook.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7 fake handbook".to_vec()),
            )
            .mount(&server)
            .await;

        let (handler, blobs) = handler(
            vec![SearchHit {
                title: "Board handbook".into(),
                url: format!("{}/handbook.pdf", server.uri()),
            }],
            false,
        );

        let update = handler.run(&record()).await.expect("acquire");
        match update {
            StageUpdate::RawArtifact(blob_ref) => {
                assert_eq!(blob_ref, "raw-documents/nursing-license-reciprocity-texas.pdf");
                let bytes = blobs.get_ref(&blob_ref).expect("stored blob");
                assert!(bytes.starts_with(b"%PDF"));
            }
            other => panic!("expected RawArtifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_error_page_is_a_permanent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html><body>Page moved</body></html>"),
            )
            .mount(&server)
            .await;

        let (handler, _) = handler(
            vec![SearchHit {
                title: "Board page".into(),
                url: format!("{}/handbook.pdf", server.uri()),
            }],
            false,
        );

        let failure = handler.run(&record()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Permanent);
        assert!(failure.message.contains("wrong content type"));
    }

    #[tokio::test]
    async fn no_search_results_is_permanent() {
        let (handler, _) = handler(vec![], false);
        let failure = handler.run(&record()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Permanent);
        assert!(failure.message.contains("no source document"));
    }

    #[tokio::test]
    async fn search_outage_is_transient() {
        let (handler, _) = handler(vec![], true);
        let failure = handler.run(&record()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn download_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (handler, _) = handler(
            vec![SearchHit {
                title: "flaky".into(),
                url: format!("{}/handbook.pdf", server.uri()),
            }],
            false,
        );

        let failure = handler.run(&record()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(failure.message.contains("503"));
    }

    #[test]
    fn prefers_pdf_looking_hits() {
        let hits = vec![
            SearchHit {
                title: "FAQ".into(),
                url: "https://example.gov/faq".into(),
            },
            SearchHit {
                title: "Handbook".into(),
                url: "https://example.gov/handbook.PDF".into(),
            },
        ];
        assert_eq!(pick_hit(&hits).unwrap().title, "Handbook");

        let no_pdf = vec![hits[0].clone()];
        assert_eq!(pick_hit(&no_pdf).unwrap().title, "FAQ");
        assert!(pick_hit(&[]).is_none());
    }

    #[test]
    fn pdf_detection_uses_header_or_magic() {
        assert!(looks_like_pdf(Some("application/pdf"), b"whatever"));
        assert!(looks_like_pdf(None, b"%PDF-1.4"));
        assert!(looks_like_pdf(Some("application/octet-stream"), b"%PDF-1.4"));
        assert!(!looks_like_pdf(Some("text/html"), b"<html>"));
        assert!(!looks_like_pdf(None, b"<html>"));
    }
}
