//! Asset descriptors and key derivation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Extensions accepted for upload (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "mp4", "mov", "avi", "mkv"];

/// Stem used when sanitizing leaves nothing of the original name
const FALLBACK_STEM: &str = "upload";

/// A stored media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Unique key within the backend namespace
    pub key: String,
    /// Name shown in the gallery
    pub name: String,
    /// MIME type inferred from the extension
    pub content_type: String,
    /// Creation time used for ordering
    pub created_at: DateTime<Utc>,
    /// Size in bytes, when the backend reports it
    pub size: Option<u64>,
    /// URL the page uses to display the asset
    pub url: String,
}

impl Asset {
    /// Build a descriptor for `key`, deriving name and content type from it
    pub fn from_key(key: impl Into<String>, created_at: DateTime<Utc>, size: Option<u64>, url: String) -> Self {
        let key = key.into();
        Self {
            name: display_name(&key),
            content_type: content_type_for(&key).to_string(),
            key,
            created_at,
            size,
            url,
        }
    }

    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }
}

/// A freshly derived, never-before-issued asset key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetKey {
    /// Random identifier (32 lowercase hex digits)
    pub id: String,
    /// Sanitized base name without extension
    pub stem: String,
    /// Lowercased extension
    pub extension: String,
}

impl AssetKey {
    /// Validate `original_name` and derive a new unique key from it
    pub fn derive(original_name: &str) -> Result<Self> {
        let ext = super::validate_upload_name(original_name)?;
        let base = original_name.trim();
        let stem_raw = &base[..base.len() - ext.len() - 1];
        let stem = sanitize_filename(stem_raw);

        Ok(Self {
            id: Uuid::new_v4().simple().to_string(),
            stem: if stem.is_empty() { FALLBACK_STEM.to_string() } else { stem },
            extension: ext.to_ascii_lowercase(),
        })
    }

    /// Identifier without the extension (`<id>_<stem>`)
    pub fn base(&self) -> String {
        format!("{}_{}", self.id, self.stem)
    }

    /// Full key (`<id>_<stem>.<ext>`)
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.as_string())
    }

    pub fn is_video(&self) -> bool {
        self.content_type().starts_with("video/")
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}.{}", self.id, self.stem, self.extension)
    }
}

pub fn is_allowed_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str())
}

/// Make a user-supplied file name safe to use as a single path component.
///
/// Path separators become word breaks, whitespace runs collapse to `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots
/// and underscores are trimmed, so `../../etc/passwd` becomes
/// `etc_passwd`.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Gallery label for a key: the random prefix is dropped
pub fn display_name(key: &str) -> String {
    match key.split_once('_') {
        Some((id, rest)) if id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()) => {
            rest.to_string()
        }
        _ => key.to_string(),
    }
}

/// MIME type for a key or file name, by extension
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Convenience wrapper returning the full key string for `original_name`
pub fn new_key(original_name: &str) -> Result<String> {
    AssetKey::derive(original_name).map(|k| k.as_string())
}
