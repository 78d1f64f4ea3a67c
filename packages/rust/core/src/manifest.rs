//! Manifest regeneration: the read-only publication step.
//!
//! After packaging, the manifest step scans every record whose content is
//! terminal and rewrites `sitemap.xml` plus `manifest.json`. It reads the
//! record store and writes only to the manifest directory; records are
//! never touched.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument};

use pressgang_shared::{PressgangError, Record, Result, SiteConfig};
use pressgang_storage::Store;

/// One published record in `manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub key: String,
    pub subject: String,
    /// Public page URL on the site.
    pub page_url: String,
    /// Packaged report URL, when packaging has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    /// Freshness timestamp (date of last record update).
    pub updated_at: String,
}

/// Result of a manifest regeneration.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub entries: usize,
    pub sitemap_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Regenerate `sitemap.xml` and `manifest.json` from published records.
#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
pub async fn publish(store: &Store, site: &SiteConfig, out_dir: &Path) -> Result<PublishReport> {
    let records = store.list_published().await?;
    let entries: Vec<ManifestEntry> = records
        .iter()
        .map(|r| manifest_entry(r, &site.base_url))
        .collect();

    std::fs::create_dir_all(out_dir).map_err(|e| PressgangError::io(out_dir, e))?;

    let sitemap_path = out_dir.join("sitemap.xml");
    std::fs::write(&sitemap_path, build_sitemap(&site.base_url, &entries))
        .map_err(|e| PressgangError::io(&sitemap_path, e))?;

    let manifest_path = out_dir.join("manifest.json");
    let manifest_json = serde_json::to_string_pretty(&entries)
        .map_err(|e| PressgangError::parse(format!("manifest serialization failed: {e}")))?;
    std::fs::write(&manifest_path, manifest_json)
        .map_err(|e| PressgangError::io(&manifest_path, e))?;

    info!(entries = entries.len(), "manifest regenerated");
    Ok(PublishReport {
        entries: entries.len(),
        sitemap_path,
        manifest_path,
    })
}

fn manifest_entry(record: &Record, base_url: &str) -> ManifestEntry {
    ManifestEntry {
        key: record.key.clone(),
        subject: record.subject.clone(),
        page_url: format!("{}/p/{}", base_url.trim_end_matches('/'), record.key),
        artifact_url: record.artifact_url.clone(),
        updated_at: record.updated_at.format("%Y-%m-%d").to_string(),
    }
}

/// Build the sitemap XML for the site root plus every published page.
fn build_sitemap(base_url: &str, entries: &[ManifestEntry]) -> String {
    let base = base_url.trim_end_matches('/');
    let today = chrono::Utc::now().format("%Y-%m-%d");

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    xml.push_str(&format!(
        "  <url><loc>{base}/</loc><lastmod>{today}</lastmod><priority>1.0</priority></url>\n"
    ));
    for entry in entries {
        xml.push_str(&format!(
            "  <url><loc>{}</loc><lastmod>{}</lastmod><priority>0.8</priority></url>\n",
            entry.page_url, entry.updated_at
        ));
    }
    xml.push_str("</urlset>");
    xml
}
