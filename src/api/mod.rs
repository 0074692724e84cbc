//! HTTP API Module
//!
//! Gallery controller: login, listing, upload and delete pages over the
//! configured storage backend.

mod http;
mod render;

pub use http::{AppState, HttpServer};
