//! HTTP Server
//!
//! Login, gallery listing, upload and delete pages. Every route except
//! `/login` and `/health` requires a valid session and otherwise redirects
//! to `/login`. Outcomes travel to the next page as flash messages.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::auth::{CredentialGate, Flash, SessionSigner};
use crate::config::{BackendKind, GalleryConfig};
use crate::error::{Error, Result};
use crate::storage::{is_plain_key, Removal, StorageBackend};
use super::render;

/// Shared application state
pub struct AppState {
    /// Active storage backend
    pub storage: Arc<dyn StorageBackend>,
    /// Single-account credential check
    pub gate: CredentialGate,
    /// Session and flash cookie signer
    pub sessions: SessionSigner,
    /// Upload directory served under `/uploads` (local backend only)
    pub upload_dir: Option<PathBuf>,
    /// Largest accepted upload request in bytes
    pub max_upload_bytes: usize,
}

/// HTTP server
pub struct HttpServer {
    bind_address: String,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server around an already built storage backend
    pub fn new(config: &GalleryConfig, storage: Arc<dyn StorageBackend>) -> Self {
        let gate = CredentialGate::new(
            config.auth.username.clone(),
            &config.auth.password,
            config.auth.password_rounds,
        );
        let sessions = SessionSigner::new(
            config.auth.secret_key.as_bytes(),
            config.session_ttl(),
            config.auth.secure_cookies,
        );
        let upload_dir = match storage.kind() {
            BackendKind::Local => Some(config.storage.local.upload_dir.clone()),
            _ => None,
        };

        let state = Arc::new(AppState {
            storage,
            gate,
            sessions,
            upload_dir,
            max_upload_bytes: config.max_upload_bytes(),
        });

        Self {
            bind_address: config.server.bind_address.clone(),
            state,
        }
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>) -> Router {
        let upload_limit = state.max_upload_bytes;
        Router::new()
            // Gallery
            .route("/", get(handle_index))
            .route(
                "/upload",
                post(handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
            )
            .route("/delete/:key", post(handle_delete))
            .route("/uploads/:key", get(handle_serve_upload))
            // Session
            .route("/login", get(handle_login_page).post(handle_login))
            .route("/logout", get(handle_logout))
            // Status
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        let app = Self::create_router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Gallery listening on http://{}", self.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub backend: String,
}

// ============ Helpers ============

fn to_login() -> Response {
    Redirect::to("/login").into_response()
}

/// Redirect to `to`, carrying flash messages and any extra cookies
fn redirect_with(state: &AppState, to: &str, flashes: &[Flash], extra_cookie: Option<String>) -> Response {
    let mut cookies: Vec<String> = extra_cookie.into_iter().collect();
    if !flashes.is_empty() {
        match state.sessions.flash_cookie(flashes) {
            Ok(cookie) => cookies.push(cookie),
            Err(e) => tracing::warn!("Dropping flash messages: {}", e),
        }
    }
    let headers: Vec<_> = cookies
        .into_iter()
        .map(|cookie| (header::SET_COOKIE, cookie))
        .collect();
    (AppendHeaders(headers), Redirect::to(to)).into_response()
}

/// Render a page, consuming any pending flash cookie
fn render_with_flashes(state: &AppState, headers: &HeaderMap, status: StatusCode, render: impl FnOnce(&[Flash]) -> String, extra: &[Flash]) -> Response {
    let mut flashes = state.sessions.read_flashes(headers);
    let had_cookie = !flashes.is_empty();
    flashes.extend_from_slice(extra);

    let html = Html(render(&flashes));
    if had_cookie {
        (status, [(header::SET_COOKIE, state.sessions.clear_flash_cookie())], html).into_response()
    } else {
        (status, html).into_response()
    }
}

fn upload_failure(name: &str, err: &Error) -> Flash {
    match err {
        Error::Validation(_) => Flash::error(err.user_message()),
        _ => Flash::error(format!("Failed to upload {}: {}", name, err.user_message())),
    }
}

// ============ Handlers ============

/// Gallery page
async fn handle_index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !state.sessions.is_authenticated(&headers) {
        return to_login();
    }

    let listing = state.storage.list().await;
    render_with_flashes(
        &state,
        &headers,
        StatusCode::OK,
        |flashes| render::gallery_page(&listing, flashes),
        &[],
    )
}

/// Accept one or more `file` parts; each file succeeds or fails on its own
async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    if !state.sessions.is_authenticated(&headers) {
        return to_login();
    }

    let mut multipart = match multipart {
        Ok(m) => m,
        Err(_) => {
            return redirect_with(&state, "/", &[Flash::error("No file part in the form")], None);
        }
    };

    let mut saw_file_part = false;
    let mut selected = 0usize;
    let mut uploaded = 0usize;
    let mut failures = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Upload aborted while reading form: {}", e);
                failures.push(Flash::error(format!("Upload interrupted: {}", e.body_text())));
                break;
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        saw_file_part = true;

        let name = field.file_name().unwrap_or_default().to_string();
        if name.trim().is_empty() {
            continue;
        }
        selected += 1;

        let content = match field.bytes().await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read upload {}: {}", name, e);
                failures.push(Flash::error(format!("Upload of {} interrupted: {}", name, e.body_text())));
                break;
            }
        };

        match state.storage.put(&name, content).await {
            Ok(_) => uploaded += 1,
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", name, e);
                failures.push(upload_failure(&name, &e));
            }
        }
    }

    let mut flashes = Vec::new();
    if uploaded > 0 {
        flashes.push(Flash::success(format!("{} file(s) uploaded successfully", uploaded)));
    } else if !saw_file_part && failures.is_empty() {
        flashes.push(Flash::error("No file part in the form"));
    } else if selected == 0 && failures.is_empty() {
        flashes.push(Flash::error("No file selected"));
    }
    flashes.extend(failures);

    redirect_with(&state, "/", &flashes, None)
}

/// Delete one asset by exact key
async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if !state.sessions.is_authenticated(&headers) {
        return to_login();
    }

    let flash = match state.storage.delete(&key).await {
        Ok(Removal::Deleted) => Flash::success(format!("{} deleted successfully", key)),
        Ok(Removal::NotFound) => Flash::error("File not found"),
        Err(e) => {
            tracing::warn!("Delete of {} failed: {}", key, e);
            Flash::error(e.user_message())
        }
    };

    redirect_with(&state, "/", &[flash], None)
}

/// Serve a file from the local upload directory
async fn handle_serve_upload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    request: Request,
) -> Response {
    if !state.sessions.is_authenticated(request.headers()) {
        return to_login();
    }

    let Some(dir) = &state.upload_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !is_plain_key(&key) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match ServeFile::new(dir.join(&key)).oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(never) => match never {},
    }
}

/// Login page
async fn handle_login_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    render_with_flashes(&state, &headers, StatusCode::OK, render::login_page, &[])
}

/// Check credentials and start a session
async fn handle_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.gate.authenticate(&form.username, &form.password) {
        tracing::info!("Rejected login attempt");
        return render_with_flashes(
            &state,
            &headers,
            StatusCode::OK,
            render::login_page,
            &[Flash::error("Invalid username or password")],
        );
    }

    match state.sessions.login_cookie() {
        Ok(cookie) => {
            tracing::info!("User logged in");
            redirect_with(&state, "/", &[Flash::success("Login successful!")], Some(cookie))
        }
        Err(e) => {
            tracing::error!("Failed to issue session: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start session").into_response()
        }
    }
}

/// End the session
async fn handle_logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !state.sessions.is_authenticated(&headers) {
        return to_login();
    }

    let cookie = state.sessions.logout_cookie();
    redirect_with(&state, "/login", &[Flash::success("Logged out successfully")], Some(cookie))
}

/// Health check
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        backend: state.storage.kind().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::Request as HttpRequest;
    use tempfile::TempDir;

    use crate::auth::SESSION_COOKIE;
    use crate::storage::LocalStorage;

    const BOUNDARY: &str = "XMEDIAVAULTBOUNDARY";

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        dir: TempDir,
    }

    async fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).await.unwrap();
        let state = Arc::new(AppState {
            storage: Arc::new(storage),
            gate: CredentialGate::new("ananb", "MICKKY", 1_000),
            sessions: SessionSigner::new(b"router-test-secret-key", Duration::from_secs(3600), false),
            upload_dir: Some(dir.path().to_path_buf()),
            max_upload_bytes: 1024 * 1024,
        });
        TestApp {
            router: HttpServer::create_router(Arc::clone(&state)),
            state,
            dir,
        }
    }

    async fn send(app: &TestApp, request: HttpRequest<Body>) -> Response {
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// `name=value` pairs from every Set-Cookie header
    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
            .collect()
    }

    fn login_request(username: &str, password: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={}&password={}", username, password)))
            .unwrap()
    }

    async fn session_cookie(app: &TestApp) -> String {
        let response = send(app, login_request("ananb", "MICKKY")).await;
        set_cookies(&response)
            .into_iter()
            .find(|c| c.starts_with(SESSION_COOKIE))
            .unwrap()
    }

    fn multipart_body(files: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, data) in files {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Body::from(body)
    }

    fn upload_request(cookie: &str, files: &[(&str, &[u8])]) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/upload")
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(files))
            .unwrap()
    }

    fn get(uri: &str, cookie: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    /// Follow a redirect back to the gallery, presenting the flash cookie
    async fn gallery_after(app: &TestApp, session: &str, redirect: &Response) -> String {
        let mut cookies = vec![session.to_string()];
        cookies.extend(set_cookies(redirect));
        let response = send(app, get("/", &cookies.join("; "))).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    }

    #[tokio::test]
    async fn test_protected_routes_redirect_to_login() {
        let app = test_app().await;

        for uri in ["/", "/logout", "/uploads/x.png"] {
            let response = send(&app, get(uri, "")).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(location(&response), "/login");
        }

        let response = send(&app, upload_request("", &[("cat.png", b"png")])).await;
        assert_eq!(location(&response), "/login");
        assert!(app.state.storage.list().await.assets.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_login_stays_logged_out() {
        let app = test_app().await;

        for (user, pass) in [("ananb", "wrong"), ("someone", "MICKKY"), ("", "")] {
            let response = send(&app, login_request(user, pass)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(set_cookies(&response).iter().all(|c| !c.starts_with(SESSION_COOKIE)));
            assert!(body_text(response).await.contains("Invalid username or password"));
        }
    }

    #[tokio::test]
    async fn test_login_then_view_gallery() {
        let app = test_app().await;

        let response = send(&app, login_request("ananb", "MICKKY")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let session = set_cookies(&response)
            .into_iter()
            .find(|c| c.starts_with(SESSION_COOKIE))
            .unwrap();
        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains("Login successful!"));
        assert!(page.contains("No media yet"));
    }

    #[tokio::test]
    async fn test_upload_continues_past_bad_files() {
        let app = test_app().await;
        let session = session_cookie(&app).await;

        let response = send(
            &app,
            upload_request(&session, &[("cat.png", b"png"), ("setup.exe", b"MZ"), ("clip.mp4", b"mp4")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains("2 file(s) uploaded successfully"));
        assert!(page.contains("Unsupported file type: setup.exe"));
        assert_eq!(app.state.storage.list().await.assets.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_with_only_bad_files_reports_error() {
        let app = test_app().await;
        let session = session_cookie(&app).await;

        let response = send(&app, upload_request(&session, &[("notes.txt", b"hi")])).await;
        let page = gallery_after(&app, &session, &response).await;
        assert!(!page.contains("uploaded successfully"));
        assert!(page.contains("Unsupported file type: notes.txt"));
        assert!(app.state.storage.list().await.assets.is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_selection() {
        let app = test_app().await;
        let session = session_cookie(&app).await;

        let response = send(&app, upload_request(&session, &[("", b"")])).await;
        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains("No file selected"));
    }

    #[tokio::test]
    async fn test_upload_traversal_name_lands_in_upload_dir() {
        let app = test_app().await;
        let session = session_cookie(&app).await;

        send(&app, upload_request(&session, &[("../../etc/passwd.png", b"png")])).await;

        let assets = app.state.storage.list().await.assets;
        assert_eq!(assets.len(), 1);
        assert!(!assets[0].key.contains('/'));
        assert!(app.dir.path().join(&assets[0].key).is_file());
    }

    #[tokio::test]
    async fn test_delete_existing_then_missing() {
        let app = test_app().await;
        let session = session_cookie(&app).await;
        let asset = app
            .state
            .storage
            .put("dog.gif", bytes::Bytes::from_static(b"gif"))
            .await
            .unwrap();

        let delete = |key: String| {
            HttpRequest::builder()
                .method("POST")
                .uri(format!("/delete/{}", key))
                .header(header::COOKIE, session.as_str())
                .body(Body::empty())
                .unwrap()
        };

        let response = send(&app, delete(asset.key.clone())).await;
        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains(&format!("{} deleted successfully", asset.key)));
        assert!(app.state.storage.list().await.assets.is_empty());

        let response = send(&app, delete(asset.key.clone())).await;
        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains("File not found"));
    }

    #[tokio::test]
    async fn test_serves_uploaded_file() {
        let app = test_app().await;
        let session = session_cookie(&app).await;
        let asset = app
            .state
            .storage
            .put("cat.png", bytes::Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();

        let response = send(&app, get(&asset.url, &session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "png-bytes");
    }

    #[tokio::test]
    async fn test_dotted_upload_is_served_and_deletable() {
        let app = test_app().await;
        let session = session_cookie(&app).await;
        let asset = app
            .state
            .storage
            .put("a..b.png", bytes::Bytes::from_static(b"dots"))
            .await
            .unwrap();

        let response = send(&app, get(&asset.url, &session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = HttpRequest::builder()
            .method("POST")
            .uri(format!("/delete/{}", asset.key))
            .header(header::COOKIE, session.as_str())
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        let page = gallery_after(&app, &session, &response).await;
        assert!(page.contains("deleted successfully"));
        assert!(app.state.storage.list().await.assets.is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let app = test_app().await;
        let session = session_cookie(&app).await;

        let response = send(&app, get("/logout", &session)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
        assert!(set_cookies(&response).contains(&format!("{}=", SESSION_COOKIE)));
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app().await;
        let response = send(&app, get("/health", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"backend\":\"local\""));
    }
}
