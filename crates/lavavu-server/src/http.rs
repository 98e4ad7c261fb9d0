//! HTTP endpoint handlers
//!
//! Handlers never touch the backend themselves: every session call goes
//! through the session's render bridge on a blocking task. Errors are
//! logged and answered with an empty 200 of the expected content type.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use lavavu_core::SessionCore;

use crate::error::{ServerError, ServerResult};
use crate::AppState;

const JPEG: &str = "image/jpeg";
const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

const JPEG_QUALITY: u8 = 90;

/// What a GET path asks for, decided by the first marker it contains
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GetRoute {
    Image,
    Command { text: String, image: bool },
    State,
    Connect,
    Key(String),
    Mouse(String),
    File(String),
}

fn decode(text: &str) -> String {
    urlencoding::decode(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Whatever follows the first `marker` in `path`
fn after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    path.find(marker).map(|pos| &path[pos + marker.len()..])
}

impl GetRoute {
    /// Classify a raw (still percent-encoded) request path
    pub fn parse(path: &str) -> Self {
        if path.contains("image") {
            GetRoute::Image
        } else if let Some(rest) = after(path, "command=") {
            GetRoute::Command {
                text: decode(rest),
                image: path.contains("icommand="),
            }
        } else if path.contains("getstate") {
            GetRoute::State
        } else if path.contains("connect") {
            GetRoute::Connect
        } else if let Some(rest) = after(path, "key=") {
            GetRoute::Key(decode(&rest.replace('&', " ")))
        } else if let Some(rest) = after(path, "mouse=") {
            GetRoute::Mouse(decode(&rest.replace('&', " ")))
        } else {
            GetRoute::File(decode(path.trim_start_matches('/')))
        }
    }
}

fn respond(content_type: &'static str, body: impl Into<Body>) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body.into()).into_response()
}

fn empty(content_type: &'static str) -> Response {
    respond(content_type, Body::empty())
}

/// Headers every response carries
pub async fn common_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        HeaderName::from_static("x-colab-notebook-cache-control"),
        HeaderValue::from_static("no-cache"),
    );
    response
}

/// Run `f` against the live session on a blocking thread
async fn with_session<T, F>(state: &AppState, f: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SessionCore) -> ServerResult<T> + Send + 'static,
{
    let session = state.session.upgrade().ok_or(ServerError::SessionGone)?;
    tokio::task::spawn_blocking(move || f(&session))
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?
}

/// Answer `result`, or log the error and send an empty body
fn or_empty(result: ServerResult<Response>, content_type: &'static str, what: &str) -> Response {
    result.unwrap_or_else(|e| {
        warn!(request = what, "request failed: {}", e);
        empty(content_type)
    })
}

fn resolution(query: &HashMap<String, String>) -> Option<(u32, u32)> {
    let dimension = |key: &str| query.get(key).and_then(|v| v.trim().parse::<u32>().ok());
    match (dimension("width"), dimension("height")) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => Some((w, 0)),
        _ => None,
    }
}

fn jpeg(session: &SessionCore, query: &HashMap<String, String>) -> ServerResult<Response> {
    let bytes = session.jpeg(resolution(query), JPEG_QUALITY)?;
    Ok(respond(JPEG, bytes))
}

/// `GET /`: the interactive viewer page
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let result = with_session(&state, |session| Ok(respond(HTML, session.html_shell()))).await;
    or_empty(result, HTML, "index")
}

/// `POST /`: the body is a control request
pub async fn index_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if body.is_empty() {
        return empty(TEXT);
    }
    let text = String::from_utf8_lossy(&body).into_owned();
    let result = with_session(&state, move |session| {
        session.control(&text)?;
        Ok(empty(TEXT))
    })
    .await;
    or_empty(result, TEXT, "post")
}

/// Every other GET
pub async fn handle_get(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let route = GetRoute::parse(uri.path());
    debug!(?route, "get");
    match route {
        GetRoute::Image => {
            let result = with_session(&state, move |session| jpeg(session, &query)).await;
            or_empty(result, JPEG, "image")
        }
        GetRoute::Command { text, image } => {
            let content_type = if image { JPEG } else { TEXT };
            let result = with_session(&state, move |session| {
                session.control(&text)?;
                if image {
                    jpeg(session, &query)
                } else {
                    Ok(empty(TEXT))
                }
            })
            .await;
            or_empty(result, content_type, "command")
        }
        GetRoute::State => {
            let result =
                with_session(&state, |session| Ok(respond(JSON, session.state()?.to_string())))
                    .await;
            or_empty(result, JSON, "getstate")
        }
        GetRoute::Connect => {
            let url = query.get("url").cloned().unwrap_or_default();
            let result = with_session(&state, move |session| {
                Ok(respond(TEXT, session.connect(&url).to_string()))
            })
            .await;
            or_empty(result, TEXT, "connect")
        }
        GetRoute::Key(args) => input(&state, "key", &args).await,
        GetRoute::Mouse(args) => input(&state, "mouse", &args).await,
        GetRoute::File(path) => serve_file(&state, &path).await,
    }
}

/// Queue a `key` or `mouse` event for the render loop
async fn input(state: &AppState, command: &'static str, args: &str) -> Response {
    let line = format!("{} {}", command, args);
    let result = with_session(state, move |session| {
        session.queue_commands(&line)?;
        Ok(empty(TEXT))
    })
    .await;
    or_empty(result, TEXT, command)
}

/// A relative path with no parent or root components
fn safe_relative(path: &str) -> Option<PathBuf> {
    let path = Path::new(path);
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| path.to_path_buf())
        .filter(|p| !p.as_os_str().is_empty())
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => HTML,
        "js" => "text/javascript",
        "css" => "text/css",
        "json" => JSON,
        "png" => "image/png",
        "jpg" | "jpeg" => JPEG,
        "svg" => "image/svg+xml",
        "txt" => TEXT,
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Serve `path` from the working directory, then from the static assets
async fn serve_file(state: &AppState, path: &str) -> Response {
    let Some(relative) = safe_relative(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let static_dir = state.static_path.clone().or_else(|| {
        state
            .session
            .upgrade()
            .and_then(|session| session.config().html_path.clone())
    });
    let candidates =
        std::iter::once(relative.clone()).chain(static_dir.map(|dir| dir.join(&relative)));
    for candidate in candidates {
        if !tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            continue;
        }
        match tokio::fs::read(&candidate).await {
            Ok(bytes) => return respond(content_type_for(&candidate), bytes),
            Err(e) => warn!(path = %candidate.display(), "could not read file: {}", e),
        }
    }
    debug!(path, "not found");
    StatusCode::NOT_FOUND.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_markers() {
        assert_eq!(GetRoute::parse("/image"), GetRoute::Image);
        assert_eq!(
            GetRoute::parse("/command=rotate%20x%2010"),
            GetRoute::Command {
                text: "rotate x 10".into(),
                image: false
            }
        );
        assert_eq!(
            GetRoute::parse("/icommand=zoom%202"),
            GetRoute::Command {
                text: "zoom 2".into(),
                image: true
            }
        );
        assert_eq!(GetRoute::parse("/getstate"), GetRoute::State);
        assert_eq!(GetRoute::parse("/connect"), GetRoute::Connect);
        assert_eq!(GetRoute::parse("/key=65&shift"), GetRoute::Key("65 shift".into()));
        assert_eq!(GetRoute::parse("/mouse=down%2C1"), GetRoute::Mouse("down,1".into()));
        assert_eq!(GetRoute::parse("/control.js"), GetRoute::File("control.js".into()));
    }

    #[test]
    fn test_resolution_query() {
        let mut query = HashMap::new();
        assert_eq!(resolution(&query), None);
        query.insert("width".to_string(), "64".to_string());
        assert_eq!(resolution(&query), Some((64, 0)));
        query.insert("height".to_string(), "48".to_string());
        assert_eq!(resolution(&query), Some((64, 48)));
        query.insert("height".to_string(), "tall".to_string());
        assert_eq!(resolution(&query), Some((64, 0)));
    }

    #[test]
    fn test_static_paths_stay_inside() {
        assert!(safe_relative("control.js").is_some());
        assert!(safe_relative("js/control.js").is_some());
        assert!(safe_relative("../secret").is_none());
        assert!(safe_relative("/etc/passwd").is_none());
        assert!(safe_relative("").is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.JS")), "text/javascript");
        assert_eq!(content_type_for(Path::new("frame.jpg")), JPEG);
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
