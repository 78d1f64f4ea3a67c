//! Packaging: render the terminal report artifact and publish its URL.
//!
//! Builds the fixed-structure report document from the record's facts,
//! renders it to PDF, uploads it to the reports bucket, and writes back
//! the public reference URL.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use pressgang_render::{ReportDocument, render_pdf};
use pressgang_shared::{Record, Stage};
use pressgang_storage::{BlobStore, REPORT_BUCKET, StageUpdate};

use crate::executor::{HandlerResult, StageFailure, StageHandler};

/// Packaging stage handler.
pub struct PackageHandler {
    blobs: BlobStore,
}

impl PackageHandler {
    pub fn new(blobs: BlobStore) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl StageHandler for PackageHandler {
    fn stage(&self) -> Stage {
        Stage::Package
    }

    async fn run(&self, record: &Record) -> HandlerResult {
        // Eligibility already guarantees synthesis is done; these guards
        // catch records mutated outside the pipeline.
        if record.final_content.is_none() {
            return Err(StageFailure::permanent("record has no synthesized content"));
        }
        let Some(facts) = &record.facts else {
            return Err(StageFailure::permanent("record has no structured facts"));
        };

        let generated_on = Utc::now().format("%Y-%m-%d").to_string();
        let report = ReportDocument::from_facts(&record.subject, &record.key, facts, &generated_on);

        let bytes = render_pdf(&report)
            .map_err(|e| StageFailure::permanent(format!("report rendering failed: {e}")))?;

        let file_name = format!("Audit_{}.pdf", record.key);
        self.blobs
            .put(REPORT_BUCKET, &file_name, &bytes)
            .map_err(|e| StageFailure::transient(format!("report upload failed: {e}")))?;

        let url = self.blobs.public_url(REPORT_BUCKET, &file_name);
        info!(key = %record.key, %url, bytes = bytes.len(), "report packaged");
        Ok(StageUpdate::ArtifactUrl(url))
    }
}
