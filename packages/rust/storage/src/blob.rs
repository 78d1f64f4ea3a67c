//! Filesystem-backed blob store with public-URL resolution.
//!
//! Blobs live under `<root>/<bucket>/<key>` and are served from a
//! configured public base URL. Two buckets are in use: acquired source
//! documents and packaged reports.

use std::path::{Path, PathBuf};

use pressgang_shared::{PressgangError, Result};

/// Bucket for acquired raw source documents.
pub const RAW_BUCKET: &str = "raw-documents";

/// Bucket for packaged report artifacts.
pub const REPORT_BUCKET: &str = "reports";

/// Handle to the blob store root.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl BlobStore {
    /// Create a blob store rooted at `root`, served under `public_base_url`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store bytes under `bucket/key`, overwriting any previous version.
    /// Returns the blob reference (`bucket/key`).
    pub fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<String> {
        validate_component(bucket)?;
        validate_component(key)?;

        let dir = self.root.join(bucket);
        std::fs::create_dir_all(&dir).map_err(|e| PressgangError::io(&dir, e))?;

        let path = dir.join(key);
        std::fs::write(&path, bytes).map_err(|e| PressgangError::io(&path, e))?;

        Ok(format!("{bucket}/{key}"))
    }

    /// Read the bytes stored under `bucket/key`.
    pub fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_component(bucket)?;
        validate_component(key)?;

        let path = self.root.join(bucket).join(key);
        std::fs::read(&path).map_err(|e| PressgangError::io(&path, e))
    }

    /// Read a blob by its `bucket/key` reference.
    pub fn get_ref(&self, blob_ref: &str) -> Result<Vec<u8>> {
        let (bucket, key) = blob_ref.split_once('/').ok_or_else(|| {
            PressgangError::validation(format!("malformed blob reference: {blob_ref}"))
        })?;
        self.get(bucket, key)
    }

    /// Public URL under which `bucket/key` is served.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.public_base_url)
    }

    /// The store root on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reject path components that could escape the store root.
fn validate_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component.contains('/')
        || component.contains('\\')
        || component.contains("..")
    {
        return Err(PressgangError::validation(format!(
            "invalid blob path component: {component:?}"
        )));
    }
    Ok(())
}
