//! Storage Backends
//!
//! One upload/list/delete contract over three interchangeable backends:
//! a local upload directory, an S3-compatible bucket and a CDN asset host.
//! Key derivation and upload validation live here so every backend names
//! and rejects files the same way.

mod asset;
mod cdn;
mod local;
mod object;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Error, Result};

pub use asset::{
    content_type_for, display_name, is_allowed_extension, new_key, sanitize_filename,
    Asset, AssetKey, ALLOWED_EXTENSIONS,
};
pub use cdn::CdnStorage;
pub use local::LocalStorage;
pub use object::ObjectStorage;

/// Result of a listing: the assets that could be read plus a reportable
/// error when the backend failed. A failed listing is empty, never a fault.
#[derive(Debug, Default)]
pub struct Listing {
    pub assets: Vec<Asset>,
    pub error: Option<String>,
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NotFound,
}

/// A media storage backend
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs and the health endpoint
    fn kind(&self) -> BackendKind;

    /// Enumerate every stored asset in backend order
    async fn list_assets(&self) -> Result<Vec<Asset>>;

    /// Write `content` under a freshly derived key
    async fn store(&self, key: &AssetKey, content: Bytes) -> Result<Asset>;

    /// Remove the asset stored under exactly `key`
    async fn remove(&self, key: &str) -> Result<Removal>;

    /// All assets, most recent first. Backend failures become an empty
    /// listing with an error message.
    async fn list(&self) -> Listing {
        match self.list_assets().await {
            Ok(mut assets) => {
                sort_newest_first(&mut assets);
                Listing { assets, error: None }
            }
            Err(e) => {
                tracing::warn!("{} listing failed: {}", self.kind(), e);
                Listing {
                    assets: Vec::new(),
                    error: Some(e.user_message()),
                }
            }
        }
    }

    /// Validate an upload and store it under a new unique key
    async fn put(&self, original_name: &str, content: Bytes) -> Result<Asset> {
        let key = AssetKey::derive(original_name)?;
        let asset = self.store(&key, content).await?;
        tracing::info!("Stored {} as {} ({} backend)", original_name, asset.key, self.kind());
        Ok(asset)
    }

    /// Delete an asset by exact key. Keys that could escape the namespace
    /// are reported as not found without touching the backend.
    async fn delete(&self, key: &str) -> Result<Removal> {
        if !is_plain_key(key) {
            tracing::warn!("Rejected delete of suspicious key {:?}", key);
            return Ok(Removal::NotFound);
        }
        let removal = self.remove(key).await?;
        tracing::info!("Delete {} on {} backend: {:?}", key, self.kind(), removal);
        Ok(removal)
    }
}

/// Build the configured backend
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::Local => Arc::new(LocalStorage::new(config.local.upload_dir.clone()).await?),
        BackendKind::Object => Arc::new(ObjectStorage::new(&config.object)?),
        BackendKind::Cdn => Arc::new(CdnStorage::new(&config.cdn)?),
    };
    tracing::info!("Using {} storage backend", backend.kind());
    Ok(backend)
}

/// Newest first; ties broken by key so the order is stable
pub fn sort_newest_first(assets: &mut [Asset]) {
    assets.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// A key is acceptable when it is a single, non-hidden path component.
/// Inner dot runs (`a..b.png`) are fine; `.` and `..` are caught by the
/// leading-dot check.
pub fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\', '\0'])
}

/// Reject anything that is not a supported media file name
pub(crate) fn validate_upload_name(original_name: &str) -> Result<&str> {
    let name = original_name.trim();
    if name.is_empty() {
        return Err(Error::Validation("No file selected".into()));
    }
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| is_allowed_extension(ext))
        .ok_or_else(|| Error::Validation(format!("Unsupported file type: {}", name)))?;
    Ok(ext)
}
