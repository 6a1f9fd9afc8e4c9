//! HTTP router dispatching API requests to the file components.
//!
//! Every handler resolves the client path through [`PathResolver`] first.
//! Domain errors are mapped to generic [`ErrorMessage`] bodies; the detail
//! is logged here and never sent to the client.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use protocol::{Classification, DirectoryListing, ErrorCode, ErrorMessage, RootInfo};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::config::PreviewConfig;
use crate::files::{
    classify, content_type, ContentDelivery, Delivery, DeliveryBody, DeliveryStatus,
    DirectoryLister, FileError, MeshFormat, PathResolver, ResolveError, ResolvedPath,
    RootRegistry,
};

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// File operation error.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::File(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RouterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RouterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self) -> ErrorMessage {
        match self {
            RouterError::File(e) => e.to_error_message(),
            RouterError::InvalidRequest(reason) => ErrorMessage {
                code: ErrorCode::InvalidRequest,
                message: reason.clone(),
                recoverable: false,
            },
            RouterError::Internal(_) => ErrorMessage {
                code: ErrorCode::InternalError,
                message: "internal error".to_string(),
                recoverable: false,
            },
        }
    }

    fn log(&self) {
        match self {
            RouterError::File(FileError::Rejected(reason @ ResolveError::NotFound)) => {
                debug!(reason = %reason, "Request path not found");
            }
            RouterError::File(FileError::Rejected(reason)) => {
                warn!(reason = %reason, "Rejected request path");
            }
            RouterError::File(e @ (FileError::NotFound(_) | FileError::NotPreviewable(_))) => {
                debug!(error = %e, "File request failed");
            }
            RouterError::File(e) => error!(error = %e, "File request failed"),
            RouterError::InvalidRequest(reason) => debug!(reason = %reason, "Invalid request"),
            RouterError::Internal(e) => error!(error = %e, "Internal error"),
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.to_error_message())).into_response()
    }
}

/// Result type for router handlers.
pub type RouterResult<T> = Result<T, RouterError>;

/// Shared handler state.
///
/// Cloned per request; every component is immutable and shares the root
/// registry through an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    resolver: PathResolver,
    lister: DirectoryLister,
    delivery: ContentDelivery,
}

impl AppState {
    /// Create handler state over the given roots and limits.
    pub fn new(registry: Arc<RootRegistry>, preview: &PreviewConfig) -> Self {
        Self {
            resolver: PathResolver::new(registry.clone()).with_max_path_len(preview.max_path_len),
            lister: DirectoryLister::new(registry),
            delivery: ContentDelivery::new(preview.delivery_options()),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve a request path on a blocking worker.
    async fn resolve(&self, path: String, root: Option<usize>) -> RouterResult<ResolvedPath> {
        let resolver = self.resolver.clone();
        let resolved = tokio::task::spawn_blocking(move || match root {
            Some(root) => resolver.resolve_in(root, &path),
            None => resolver.resolve(&path),
        })
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))?;
        resolved.map_err(|e| RouterError::File(e.into()))
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/roots", get(roots))
        .route("/api/list", get(list))
        .route("/api/file", get(file))
        .route("/api/preview", get(preview))
        .route("/api/classify", get(classify_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query for listing a directory.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub path: String,
    /// Include dotfiles (default true).
    pub hidden: Option<bool>,
    pub root: Option<usize>,
}

/// Query addressing a single file.
#[derive(Debug, Default, Deserialize)]
pub struct FileParams {
    pub path: String,
    pub root: Option<usize>,
    /// Mesh encoding: `json` (default) or `msgpack`.
    pub format: Option<String>,
}

async fn roots(State(state): State<AppState>) -> Json<Vec<RootInfo>> {
    Json(state.resolver.registry().to_protocol())
}

async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> RouterResult<Json<DirectoryListing>> {
    debug!(path = %params.path, hidden = ?params.hidden, "Listing directory");

    let resolved = state.resolve(params.path, params.root).await?;
    let lister = state.lister.clone();
    let include_hidden = params.hidden.unwrap_or(true);

    let listing = tokio::task::spawn_blocking(move || lister.listing(&resolved, include_hidden))
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))??;
    Ok(Json(listing))
}

async fn file(
    State(state): State<AppState>,
    Query(params): Query<FileParams>,
    headers: HeaderMap,
) -> RouterResult<Response> {
    let range = range_header(&headers);
    debug!(path = %params.path, range = ?range, "Serving raw file");

    let resolved = state.resolve(params.path, params.root).await?;
    let delivery = state.delivery.deliver_raw(&resolved, range).await?;
    Ok(delivery_response(delivery))
}

async fn preview(
    State(state): State<AppState>,
    Query(params): Query<FileParams>,
    headers: HeaderMap,
) -> RouterResult<Response> {
    let format = MeshFormat::parse(params.format.as_deref()).ok_or_else(|| {
        RouterError::InvalidRequest("format must be json or msgpack".to_string())
    })?;
    let range = range_header(&headers);

    let resolved = state.resolve(params.path, params.root).await?;
    let kind = classify(&resolved.file_name());
    debug!(path = %resolved.relative(), preview = %kind, "Serving preview");

    let delivery = state
        .delivery
        .deliver(&resolved, kind, range, format)
        .await?;
    Ok(delivery_response(delivery))
}

async fn classify_path(
    State(state): State<AppState>,
    Query(params): Query<FileParams>,
) -> RouterResult<Json<Classification>> {
    let resolved = state.resolve(params.path, params.root).await?;
    let name = resolved.file_name();
    Ok(Json(Classification {
        path: resolved.relative().to_string(),
        preview: classify(&name),
        content_type: content_type(&name).to_string(),
    }))
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}

/// Convert a delivery into an HTTP response.
///
/// Streamed bodies keep the file open only as long as the response body
/// lives; hyper drops it when the client disconnects.
pub fn delivery_response(delivery: Delivery) -> Response {
    let status = match delivery.status {
        DeliveryStatus::Ok => StatusCode::OK,
        DeliveryStatus::PartialContent => StatusCode::PARTIAL_CONTENT,
        DeliveryStatus::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
    };

    let body = match delivery.body {
        DeliveryBody::Empty => Body::empty(),
        DeliveryBody::Stream(stream) => Body::from_stream(stream),
        DeliveryBody::Bytes(bytes) => Body::from(bytes),
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &delivery.headers {
        builder = builder.header(*name, value.as_str());
    }

    builder.body(body).unwrap_or_else(|e| {
        RouterError::Internal(format!("invalid response header: {e}")).into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) {
        fs::create_dir_all(dir.join("root/photos")).unwrap();
        fs::write(dir.join("root/photos/beach.jpg"), b"\xff\xd8\xff\xe0jpeg").unwrap();
        fs::write(dir.join("root/readme.md"), "# hello").unwrap();
        fs::write(dir.join("root/.env"), "SECRET=1").unwrap();
        fs::write(dir.join("secret.txt"), "Secret").unwrap();
    }

    fn state_for(dir: &Path) -> AppState {
        let registry = Arc::new(RootRegistry::new([dir.join("root")]).unwrap());
        AppState::new(registry, &PreviewConfig::default())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn file_params(path: &str) -> FileParams {
        FileParams {
            path: path.to_string(),
            ..FileParams::default()
        }
    }

    #[tokio::test]
    async fn test_roots() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let Json(roots) = roots(State(state)).await;
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "root");
    }

    #[tokio::test]
    async fn test_list_root() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let Json(listing) = list(State(state.clone()), Query(ListParams::default()))
            .await
            .unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["photos", ".env", "readme.md"]);

        let hidden_off = ListParams {
            hidden: Some(false),
            ..ListParams::default()
        };
        let Json(listing) = list(State(state), Query(hidden_off)).await.unwrap();
        assert_eq!(listing.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_traversal_and_missing_are_identical() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let escape = ListParams {
            path: "../".to_string(),
            ..ListParams::default()
        };
        let missing = ListParams {
            path: "nope".to_string(),
            ..ListParams::default()
        };

        let escape = list(State(state.clone()), Query(escape))
            .await
            .unwrap_err()
            .into_response();
        let missing = list(State(state), Query(missing))
            .await
            .unwrap_err()
            .into_response();

        assert_eq!(escape.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(escape).await, body_json(missing).await);
    }

    #[tokio::test]
    async fn test_file_range_response() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=0-3".parse().unwrap());
        let response = file(State(state), Query(file_params("photos/beach.jpg")), headers)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-3/8");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"\xff\xd8\xff\xe0");
    }

    #[tokio::test]
    async fn test_preview_text() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let response = preview(State(state), Query(file_params("readme.md")), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["content"], "# hello");
        assert_eq!(json["truncated"], false);
    }

    #[tokio::test]
    async fn test_preview_bad_format() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let params = FileParams {
            format: Some("xml".to_string()),
            ..file_params("readme.md")
        };
        let err = preview(State(state), Query(params), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_classify() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let Json(result) = classify_path(State(state), Query(file_params("photos/beach.jpg")))
            .await
            .unwrap();
        assert_eq!(result.preview, protocol::PreviewKind::Image);
        assert_eq!(result.content_type, "image/jpeg");
        assert_eq!(result.path, "photos/beach.jpg");
    }

    #[tokio::test]
    async fn test_list_file_is_server_error() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let state = state_for(temp_dir.path());

        let params = ListParams {
            path: "readme.md".to_string(),
            ..ListParams::default()
        };
        let err = list(State(state), Query(params)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_error_message().code, ErrorCode::NotADirectory);
    }

    #[test]
    fn test_internal_error_is_generic() {
        let msg = RouterError::Internal("worker panicked at /srv/x".to_string()).to_error_message();
        assert_eq!(msg.message, "internal error");
    }
}
