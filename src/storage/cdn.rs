//! CDN asset host storage (Cloudinary upload and admin APIs)
//!
//! The host issues a public id and tracks the file format separately, so a
//! key is `<public_id>.<format>`. Images and videos live under different
//! resource types and both are enumerated when listing.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::{BackendKind, CdnStorageConfig};
use crate::error::{Error, Result};
use super::{content_type_for, Asset, AssetKey, Removal, StorageBackend};

/// Largest page the admin API returns
const PAGE_SIZE: u32 = 500;

/// Resource types holding gallery media
const RESOURCE_TYPES: [&str; 2] = ["image", "video"];

/// CDN asset host backend
pub struct CdnStorage {
    client: Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

/// One resource as reported by the upload and admin APIs
#[derive(Debug, Deserialize)]
struct Resource {
    public_id: String,
    format: String,
    created_at: String,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourcePage {
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResult {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

impl CdnStorage {
    pub fn new(config: &CdnStorageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.cloud_name, path)
    }

    /// Sign request parameters: sorted `k=v` pairs joined by `&`, followed by
    /// the API secret, hashed with SHA-1
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn to_asset(&self, resource: Resource) -> Option<Asset> {
        // Folder-scoped ids (samples, other apps) cannot be addressed as keys
        if resource.public_id.contains('/') {
            return None;
        }
        let key = format!("{}.{}", resource.public_id, resource.format);
        let created_at = DateTime::parse_from_rfc3339(&resource.created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let url = resource.secure_url.unwrap_or_default();
        Some(Asset::from_key(key, created_at, resource.bytes, url))
    }

    async fn list_resource_type(&self, resource_type: &str) -> Result<Vec<Asset>> {
        let url = self.endpoint(&format!("resources/{}/upload", resource_type));
        let mut assets = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .basic_auth(&self.api_key, Some(&self.api_secret))
                .query(&[("max_results", PAGE_SIZE.to_string())]);
            if let Some(c) = &cursor {
                request = request.query(&[("next_cursor", c)]);
            }

            let page: ResourcePage = check_response(request.send().await?).await?.json().await?;
            debug!("Fetched {} {} resource(s)", page.resources.len(), resource_type);
            assets.extend(page.resources.into_iter().filter_map(|r| self.to_asset(r)));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(assets)
    }
}

fn resource_type_for(name: &str) -> &'static str {
    if content_type_for(name).starts_with("video/") {
        "video"
    } else {
        "image"
    }
}

/// Turn non-success responses into storage errors, keeping the API's message.
/// A 404 here means the cloud or endpoint is wrong, so it is a backend
/// failure; `remove` handles a missing resource before calling this.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::BackendUnavailable(format!(
            "CDN rejected credentials ({}): {}",
            status, message
        ))),
        _ => Err(Error::BackendUnavailable(format!(
            "CDN request failed ({}): {}",
            status, message
        ))),
    }
}

#[async_trait]
impl StorageBackend for CdnStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Cdn
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();
        for resource_type in RESOURCE_TYPES {
            assets.extend(self.list_resource_type(resource_type).await?);
        }
        Ok(assets)
    }

    async fn store(&self, key: &AssetKey, content: Bytes) -> Result<Asset> {
        let public_id = key.base();
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())]);
        let resource_type = if key.is_video() { "video" } else { "image" };

        let file = reqwest::multipart::Part::bytes(content.to_vec())
            .file_name(key.as_string())
            .mime_str(key.content_type())?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id)
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint(&format!("{}/upload", resource_type)))
            .multipart(form)
            .send()
            .await?;
        let resource: Resource = check_response(response).await?.json().await?;

        self.to_asset(resource)
            .ok_or_else(|| Error::BackendUnavailable("CDN returned a folder-scoped public id".into()))
    }

    async fn remove(&self, key: &str) -> Result<Removal> {
        // The destroy call takes the bare public id
        let public_id = key.rsplit_once('.').map(|(id, _)| id).unwrap_or(key);
        let resource_type = resource_type_for(key);
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(self.endpoint(&format!("{}/destroy", resource_type)))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Removal::NotFound);
        }
        let result: DestroyResult = check_response(response).await?.json().await?;

        match result.result.as_str() {
            "ok" => Ok(Removal::Deleted),
            "not found" => Ok(Removal::NotFound),
            other => Err(Error::BackendUnavailable(format!(
                "unexpected destroy result '{}' for {}",
                other, key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    async fn setup_mock_server() -> (ServerGuard, CdnStorage) {
        let server = Server::new_async().await;
        let storage = CdnStorage::new(&CdnStorageConfig {
            cloud_name: "demo".to_string(),
            api_key: "123456".to_string(),
            api_secret: "abcd".to_string(),
            api_base: server.url(),
        })
        .unwrap();
        (server, storage)
    }

    fn resource_json(public_id: &str, format: &str, created_at: &str) -> serde_json::Value {
        serde_json::json!({
            "public_id": public_id,
            "format": format,
            "created_at": created_at,
            "bytes": 10,
            "secure_url": format!("https://cdn.example/{}.{}", public_id, format),
        })
    }

    #[test]
    fn test_signature_sorts_parameters() {
        let storage = CdnStorage::new(&CdnStorageConfig {
            api_secret: "abcd".to_string(),
            ..CdnStorageConfig::default()
        })
        .unwrap();

        let a = storage.sign(&[("timestamp", "1315060510"), ("public_id", "sample")]);
        let b = storage.sign(&[("public_id", "sample"), ("timestamp", "1315060510")]);
        assert_eq!(a, b);

        let mut hasher = Sha1::new();
        hasher.update(b"public_id=sample&timestamp=1315060510abcd");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[tokio::test]
    async fn test_upload_returns_asset() {
        let (mut server, storage) = setup_mock_server().await;
        let key = AssetKey::derive("beach.png").unwrap();

        let mock = server
            .mock("POST", "/demo/image/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(resource_json(&key.base(), "png", "2024-05-01T10:20:30Z").to_string())
            .create_async()
            .await;

        let asset = storage.store(&key, Bytes::from_static(b"png")).await.unwrap();
        assert_eq!(asset.key, key.as_string());
        assert_eq!(asset.name, "beach.png");
        assert_eq!(asset.size, Some(10));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_video_upload_uses_video_endpoint() {
        let (mut server, storage) = setup_mock_server().await;
        let key = AssetKey::derive("clip.mp4").unwrap();

        let mock = server
            .mock("POST", "/demo/video/upload")
            .with_status(200)
            .with_body(resource_json(&key.base(), "mp4", "2024-05-01T10:20:30Z").to_string())
            .create_async()
            .await;

        let asset = storage.store(&key, Bytes::from_static(b"mp4")).await.unwrap();
        assert!(asset.is_video());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_follows_cursor_and_merges_types() {
        let (mut server, storage) = setup_mock_server().await;

        let first = server
            .mock("GET", "/demo/resources/image/upload")
            .match_query(Matcher::Regex("^max_results=500$".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "resources": [resource_json("old", "png", "2024-01-01T00:00:00Z")],
                    "next_cursor": "page2",
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/demo/resources/image/upload")
            .match_query(Matcher::UrlEncoded("next_cursor".into(), "page2".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "resources": [
                        resource_json("newer", "jpg", "2024-03-01T00:00:00Z"),
                        resource_json("samples/sheep", "jpg", "2024-04-01T00:00:00Z"),
                    ],
                })
                .to_string(),
            )
            .create_async()
            .await;
        let videos = server
            .mock("GET", "/demo/resources/video/upload")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "resources": [resource_json("middle", "mp4", "2024-02-01T00:00:00Z")],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let listing = storage.list().await;
        assert!(listing.error.is_none());
        let keys: Vec<_> = listing.assets.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["newer.jpg", "middle.mp4", "old.png"]);

        first.assert_async().await;
        second.assert_async().await;
        videos.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_credentials_list_empty_with_error() {
        let (mut server, storage) = setup_mock_server().await;

        let _m = server
            .mock("GET", "/demo/resources/image/upload")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid api_key 123456"}}"#)
            .create_async()
            .await;

        let listing = storage.list().await;
        assert!(listing.assets.is_empty());
        assert!(listing.error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_cloud_lists_as_unavailable() {
        let (mut server, storage) = setup_mock_server().await;

        let _m = server
            .mock("GET", "/demo/resources/image/upload")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error":{"message":"Invalid cloud_name demo"}}"#)
            .create_async()
            .await;

        let err = storage.list_assets().await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));

        let listing = storage.list().await;
        assert!(listing.assets.is_empty());
        assert_ne!(listing.error.as_deref(), Some("File not found"));
    }

    #[tokio::test]
    async fn test_delete_404_reports_not_found() {
        let (mut server, storage) = setup_mock_server().await;

        let _m = server
            .mock("POST", "/demo/image/destroy")
            .with_status(404)
            .with_body(r#"{"error":{"message":"Resource not found"}}"#)
            .create_async()
            .await;

        assert_eq!(storage.delete("gone.png").await.unwrap(), Removal::NotFound);
    }

    #[tokio::test]
    async fn test_delete_strips_extension() {
        let (mut server, storage) = setup_mock_server().await;

        let mock = server
            .mock("POST", "/demo/video/destroy")
            .match_body(Matcher::UrlEncoded("public_id".into(), "abc_clip".into()))
            .with_status(200)
            .with_body(r#"{"result":"ok"}"#)
            .create_async()
            .await;

        assert_eq!(storage.delete("abc_clip.mov").await.unwrap(), Removal::Deleted);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_missing_reports_not_found() {
        let (mut server, storage) = setup_mock_server().await;

        let _m = server
            .mock("POST", "/demo/image/destroy")
            .with_status(200)
            .with_body(r#"{"result":"not found"}"#)
            .create_async()
            .await;

        assert_eq!(storage.delete("nothing.png").await.unwrap(), Removal::NotFound);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_backend_error() {
        let storage = CdnStorage::new(&CdnStorageConfig {
            cloud_name: "demo".to_string(),
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            api_base: "http://127.0.0.1:1".to_string(),
        })
        .unwrap();

        let err = storage.delete("x.png").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(!err.user_message().contains("127.0.0.1"));
    }
}
