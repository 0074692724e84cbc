//! Object-store storage (S3 API)
//!
//! Keys are object names in a single bucket. Listings walk every page of
//! ListObjectsV2 (rust-s3 follows continuation tokens until the result is
//! no longer truncated), so large buckets are never cut short.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::debug;

use crate::config::{BackendKind, ObjectStorageConfig};
use crate::error::{Error, Result};
use super::{is_allowed_extension, Asset, AssetKey, Removal, StorageBackend};

/// S3 bucket backend
pub struct ObjectStorage {
    bucket: Box<Bucket>,
    base_url: String,
}

impl ObjectStorage {
    /// Connect to the configured bucket (no network traffic happens here)
    pub fn new(config: &ObjectStorageConfig) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid object store credentials: {}", e)))?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| Error::Config(format!("invalid region '{}': {}", config.region, e)))?,
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| Error::Config(format!("invalid bucket '{}': {}", config.bucket, e)))?;
        // Custom endpoints (MinIO and friends) rarely support virtual-host buckets
        let bucket = if config.endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };
        let base_url = bucket.url();

        Ok(Self { bucket, base_url })
    }

    fn object_path(key: &str) -> String {
        format!("/{}", key)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.bucket.head_object(Self::object_path(key)).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) => {
                check_status(code, "HEAD", key)?;
                Ok(true)
            }
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map an S3 response code onto the storage error taxonomy
fn check_status(code: u16, op: &str, key: &str) -> Result<()> {
    match code {
        200..=299 => Ok(()),
        401 | 403 => Err(Error::BackendUnavailable(format!(
            "{} {} denied by object store (status {})",
            op, key, code
        ))),
        404 => Err(Error::NotFound(key.to_string())),
        _ => Err(Error::BackendUnavailable(format!(
            "{} {} failed with status {}",
            op, key, code
        ))),
    }
}

/// Build an asset from one ListObjectsV2 entry. Objects that are not
/// gallery media (wrong extension, "directory" markers) yield `None`.
pub(crate) fn asset_from_listing(base_url: &str, key: &str, last_modified: &str, size: u64) -> Option<Asset> {
    if key.ends_with('/') || key.contains('/') {
        return None;
    }
    let ext = key.rsplit_once('.').map(|(_, ext)| ext)?;
    if !is_allowed_extension(ext) {
        return None;
    }
    let created_at = DateTime::parse_from_rfc3339(last_modified)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Some(Asset::from_key(key, created_at, Some(size), format!("{}/{}", base_url, key)))
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Object
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let pages = self.bucket.list(String::new(), None).await?;
        debug!("Listed {} page(s) from bucket {}", pages.len(), self.bucket.name());

        let assets = pages
            .iter()
            .flat_map(|page| page.contents.iter())
            .filter_map(|obj| asset_from_listing(&self.base_url, &obj.key, &obj.last_modified, obj.size))
            .collect();
        Ok(assets)
    }

    async fn store(&self, key: &AssetKey, content: Bytes) -> Result<Asset> {
        let name = key.as_string();
        let response = self
            .bucket
            .put_object_with_content_type(Self::object_path(&name), &content, key.content_type())
            .await?;
        check_status(response.status_code(), "PUT", &name)?;

        let url = format!("{}/{}", self.base_url, name);
        Ok(Asset::from_key(name, Utc::now(), Some(content.len() as u64), url))
    }

    async fn remove(&self, key: &str) -> Result<Removal> {
        // S3 DELETE succeeds for missing keys, so existence is checked first
        if !self.exists(key).await? {
            return Ok(Removal::NotFound);
        }
        let response = self.bucket.delete_object(Self::object_path(key)).await?;
        match check_status(response.status_code(), "DELETE", key) {
            Ok(()) => Ok(Removal::Deleted),
            Err(Error::NotFound(_)) => Ok(Removal::NotFound),
            Err(e) => Err(e),
        }
    }
}
