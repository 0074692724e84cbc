//! MediaVault - Single-user Media Gallery
//!
//! A small authenticated web gallery: one account uploads images and
//! videos, browses them newest first and deletes them.
//!
//! # Architecture
//!
//! The HTTP layer is thin. The interesting part is the storage layer, where
//! one upload/list/delete contract is satisfied by three backends:
//!
//! - Local upload directory (file mtime orders the gallery)
//! - S3-compatible object store (bucket listing, fully paginated)
//! - CDN asset host (public id plus format, signed API calls)
//!
//! Every backend failure is normalized into a flash message so the gallery
//! page always renders.

pub mod config;
pub mod error;
pub mod auth;
pub mod storage;
pub mod api;

pub use config::GalleryConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BackendKind, GalleryConfig};
    pub use crate::error::{Error, Result};
    pub use crate::auth::{CredentialGate, SessionSigner};
    pub use crate::storage::{Asset, Listing, Removal, StorageBackend};
    pub use crate::api::HttpServer;
}
