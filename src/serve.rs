//! Static file responder.
//!
//! Request paths are cleaned lexically before they touch the filesystem, so `..` segments can
//! never climb above the served root. HTML documents get the reload script injected; all
//! other files go through `tower_http::services::ServeFile`, which handles ranges, content
//! types and conditional requests.

use crate::{error::LivedirError, inject::inject, server::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Document served for directory requests.
pub const INDEX_FILE: &str = "index.html";

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Fallback handler for every route other than `/ws`.
pub async fn serve_static(State(state): State<AppState>, request: Request) -> Response {
    let uri_path = request.uri().path().to_string();
    match serve_path(&state.root, &uri_path, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("{} -> {}", uri_path, e);
            match e {
                LivedirError::PermissionDenied
                | LivedirError::NotFound(_)
                | LivedirError::Io(_) => StatusCode::NOT_FOUND.into_response(),
                other => other.status_code().into_response(),
            }
        }
    }
}

async fn serve_path(
    root: &Path,
    uri_path: &str,
    request: Request,
) -> Result<Response, LivedirError> {
    let mut path = resolve_request_path(root, uri_path)?;
    let meta = tokio::fs::metadata(&path).await?;
    if meta.is_dir() {
        path.push(INDEX_FILE);
    }

    if is_html(&path) {
        let content = tokio::fs::read(&path).await.map_err(|e| {
            LivedirError::NotFound(format!("{}: {e}", path.display()))
        })?;
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
            inject(&content),
        )
            .into_response());
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(infallible) => match infallible {},
    }
}

/// Join the cleaned form of `uri_path` onto `root`.
pub fn resolve_request_path(root: &Path, uri_path: &str) -> Result<PathBuf, LivedirError> {
    Ok(root.join(clean_request_path(uri_path)?))
}

/// Percent-decode `uri_path` and resolve `.` and `..` segments against a virtual `/`, so the
/// result is always relative and never starts with `..`.
pub fn clean_request_path(uri_path: &str) -> Result<PathBuf, LivedirError> {
    let decoded = percent_decode_str(uri_path)
        .decode_utf8()
        .map_err(|_| LivedirError::NotFound(format!("undecodable path {uri_path:?}")))?;

    let mut clean = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                clean.pop();
            }
            name if name.contains('\0') => {
                return Err(LivedirError::NotFound(format!(
                    "rejected path segment {name:?}"
                )))
            }
            name => {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(part)), None) if part == name => clean.push(name),
                    _ => {
                        return Err(LivedirError::NotFound(format!(
                            "rejected path segment {name:?}"
                        )))
                    }
                }
            }
        }
    }
    Ok(clean)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "html")
        .unwrap_or(false)
}
