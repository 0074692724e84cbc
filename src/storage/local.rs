//! Local-disk storage
//!
//! Assets are plain files in one upload directory. The file name is the
//! key and the modification time is the creation time, so ordering is
//! computed on every listing from a directory scan.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::BackendKind;
use crate::error::{Error, Result};
use super::{Asset, AssetKey, Removal, StorageBackend};

/// URL prefix the HTTP layer serves the upload directory under
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Upload directory backend
pub struct LocalStorage {
    upload_dir: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) the upload directory
    pub async fn new(upload_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&upload_dir).await?;
        Ok(Self { upload_dir })
    }

    fn asset_url(key: &str) -> String {
        format!("{}/{}", UPLOADS_ROUTE, key)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut entries = fs::read_dir(&self.upload_dir)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("cannot read {:?}: {}", self.upload_dir, e)))?;

        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let key = match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => name,
                _ => continue,
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    // Deleted between the scan and the stat
                    debug!("Skipping {}: {}", key, e);
                    continue;
                }
            };
            let created_at: DateTime<Utc> = meta.modified()?.into();
            let url = Self::asset_url(&key);
            assets.push(Asset::from_key(key, created_at, Some(meta.len()), url));
        }

        Ok(assets)
    }

    async fn store(&self, key: &AssetKey, content: Bytes) -> Result<Asset> {
        let name = key.as_string();
        let path = self.upload_dir.join(&name);

        // create_new: an existing file is never replaced
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::BackendUnavailable(format!("key collision on {}", name)),
                _ => Error::Io(e),
            })?;
        file.write_all(&content).await?;
        file.sync_all().await?;

        let created_at: DateTime<Utc> = file.metadata().await?.modified()?.into();
        let url = Self::asset_url(&name);
        Ok(Asset::from_key(name, created_at, Some(content.len() as u64), url))
    }

    async fn remove(&self, key: &str) -> Result<Removal> {
        let path = self.upload_dir.join(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(Removal::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::NotFound),
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(&path).await {
            Ok(()) => Ok(Removal::Deleted),
            // Lost a race with another delete
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
