//! Extraction: pull structured facts out of the acquired document.
//!
//! The raw PDF is read page by page; to bound cost on long documents only
//! the first few pages plus pages matching a fixed topical keyword list
//! are sent to the provider router. The provider must answer with a fixed
//! JSON schema; a response that cannot be parsed marks the record
//! permanently unparseable rather than retrying a malformed source forever.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pressgang_providers::{GenerationRequest, ProviderRouter};
use pressgang_shared::{ContentFacts, Record, Stage};
use pressgang_storage::{BlobStore, StageUpdate};

use crate::executor::{HandlerResult, StageFailure, StageHandler};

/// Pages matching any of these keywords are kept beyond the first pages.
const TOPIC_KEYWORDS: &[&str] = &[
    "fee",
    "application",
    "license",
    "renewal",
    "requirement",
    "processing",
    "endorsement",
    "reciprocity",
    "verification",
    "examination",
];

/// Upper bound on the filtered text sent to the provider.
const MAX_PROMPT_CHARS: usize = 20_000;

const EXTRACTION_SYSTEM: &str = "You are a data extraction engine for regulatory documents. \
     Respond with a single JSON object and nothing else. Use the keys \
     application_fee (string), processing_time (string), requirements \
     (array of strings), steps (array of strings), evidence (array of \
     short verbatim quotes). Omit keys you cannot support with the text.";

/// Extraction stage handler.
pub struct ExtractHandler {
    blobs: BlobStore,
    router: Arc<ProviderRouter>,
    first_pages: usize,
}

impl ExtractHandler {
    pub fn new(blobs: BlobStore, router: Arc<ProviderRouter>, first_pages: usize) -> Self {
        Self {
            blobs,
            router,
            first_pages,
        }
    }

    /// Run the provider over the already-selected passage text.
    async fn extract_from_text(&self, subject: &str, text: &str) -> HandlerResult {
        let request = GenerationRequest::new(
            EXTRACTION_SYSTEM,
            format!(
                "Subject: {subject}\n\nExtract the licensing facts from this document text:\n\n{text}"
            ),
        );

        let response = self
            .router
            .generate(&request)
            .await
            .map_err(|e| StageFailure::transient(e.to_string()))?;

        // A syntactically broken response is a property of the document and
        // provider pair, not of the network: retrying forever is the failure
        // mode this branch exists to stop.
        let facts = parse_facts(&response)
            .map_err(|e| StageFailure::permanent(format!("unparseable provider response: {e}")))?;

        Ok(StageUpdate::Facts(facts))
    }
}

#[async_trait]
impl StageHandler for ExtractHandler {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    async fn run(&self, record: &Record) -> HandlerResult {
        let Some(blob_ref) = &record.raw_artifact_ref else {
            return Err(StageFailure::permanent(
                "record has no raw artifact reference",
            ));
        };

        let bytes = self
            .blobs
            .get_ref(blob_ref)
            .map_err(|e| StageFailure::transient(format!("blob read failed: {e}")))?;

        let pages = read_pdf_pages(&bytes)
            .map_err(|e| StageFailure::permanent(format!("unreadable source document: {e}")))?;

        let text = select_passages(&pages, self.first_pages, TOPIC_KEYWORDS);
        if text.trim().is_empty() {
            return Err(StageFailure::permanent(
                "source document contains no extractable text",
            ));
        }
        debug!(key = %record.key, pages = pages.len(), chars = text.len(), "passages selected");

        let result = self.extract_from_text(&record.subject, &text).await;
        if result.is_ok() {
            info!(key = %record.key, "facts extracted");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Document reading and passage selection
// ---------------------------------------------------------------------------

/// Extract per-page text from a PDF. Pages that fail to decode are skipped.
fn read_pdf_pages(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(page = page_number, error = %e, "page text extraction failed, skipping");
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

/// Keep the first `first_pages` pages plus any page matching a keyword.
///
/// This bounds provider cost on long documents while keeping the pages
/// that actually carry fees, requirements, and timelines.
fn select_passages(pages: &[String], first_pages: usize, keywords: &[&str]) -> String {
    let selected: Vec<&str> = pages
        .iter()
        .enumerate()
        .filter(|(i, page)| {
            if *i < first_pages {
                return !page.trim().is_empty();
            }
            let lower = page.to_lowercase();
            keywords.iter().any(|kw| lower.contains(kw))
        })
        .map(|(_, page)| page.as_str())
        .collect();

    let mut text = selected.join("\n\n");
    if text.len() > MAX_PROMPT_CHARS {
        text.truncate(MAX_PROMPT_CHARS);
        text.push_str("\n\n[truncated]");
    }
    text
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse the provider's response into [`ContentFacts`].
///
/// Tolerates a fenced ```json block around the object; everything else
/// must be the bare JSON the system prompt demanded.
fn parse_facts(response: &str) -> std::result::Result<ContentFacts, String> {
    let trimmed = response.trim();

    let body = if let Some(rest) = trimmed.split_once("```json").map(|(_, rest)| rest) {
        rest.split_once("```").map(|(body, _)| body).unwrap_or(rest)
    } else if let Some(rest) = trimmed.split_once("```").map(|(_, rest)| rest) {
        rest.split_once("```").map(|(body, _)| body).unwrap_or(rest)
    } else {
        trimmed
    };

    serde_json::from_str(body.trim()).map_err(|e| e.to_string())
}
