//! LavaVu Server - HTTP control surface for a session
//!
//! Serves rendered frames, the state JSON and the interactive page, and
//! accepts scripted control requests. The server holds its session weakly,
//! so dropping the session stops the server.

pub mod error;
pub mod http;
pub mod listen;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use lavavu_core::{SessionCore, WeakSession};

pub use error::{ServerError, ServerResult};

/// How often the runner checks that its session is still open
const SESSION_POLL: Duration = Duration::from_millis(250);

/// Server options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// First port to try, 0 for any
    pub port: u16,
    pub ipv6: bool,
    /// Ports and addresses to try before giving up
    pub retries: u32,
    /// Static assets, when the session has no `html_path`
    pub static_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ipv6: false,
            retries: 100,
            static_path: None,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Shared handler state
pub struct AppState {
    pub session: WeakSession,
    pub static_path: Option<PathBuf>,
}

/// Create the control router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(http::index).post(http::index_post))
        .route("/{*path}", get(http::handle_get))
        .layer(middleware::map_response(http::common_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves when `closing` is set or the session has gone away
async fn shutdown_signal(mut closing: watch::Receiver<bool>, session: WeakSession) {
    let mut ticker = tokio::time::interval(SESSION_POLL);
    loop {
        tokio::select! {
            changed = closing.changed() => {
                if changed.is_err() || *closing.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if session.upgrade().map_or(true, |s| s.is_closed()) {
                    break;
                }
            }
        }
    }
}

/// Serve on an already bound listener until shutdown
pub async fn serve(
    listener: std::net::TcpListener,
    state: Arc<AppState>,
    closing: watch::Receiver<bool>,
) -> ServerResult<()> {
    listener.set_nonblocking(true).map_err(ServerError::Bind)?;
    let listener = tokio::net::TcpListener::from_std(listener).map_err(ServerError::Bind)?;
    let session = WeakSession::clone(&state.session);
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(closing, session))
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?;
    info!("server stopped");
    Ok(())
}

/// A running control server
///
/// Runs on the ambient tokio runtime when there is one, otherwise on its
/// own thread. Dropping the handle stops the server.
pub struct Server {
    port: u16,
    closing: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind on this thread, then start serving `session`
    pub fn start(session: &SessionCore, config: &ServerConfig) -> ServerResult<Self> {
        let (listener, port) = listen::listen(config.port, config.ipv6, config.retries)?;
        let state = Arc::new(AppState {
            session: session.downgrade(),
            static_path: config.static_path.clone(),
        });
        let (closing, receiver) = watch::channel(false);

        let thread = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = serve(listener, state, receiver).await {
                        error!("server failed: {}", e);
                    }
                });
                None
            }
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("lavavu-http")
                    .enable_all()
                    .build()
                    .map_err(|e| ServerError::Runtime(e.to_string()))?;
                let thread = std::thread::Builder::new()
                    .name("lavavu-server".into())
                    .spawn(move || {
                        if let Err(e) = runtime.block_on(serve(listener, state, receiver)) {
                            error!("server failed: {}", e);
                        }
                    })
                    .map_err(|e| ServerError::Runtime(e.to_string()))?;
                Some(thread)
            }
        };

        session.set_server_port(Some(port));
        info!(port, session = session.id(), "control server started");
        Ok(Self {
            port,
            closing,
            thread,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop serving; waits for the server thread when it owns one
    pub fn close(&mut self) {
        let _ = self.closing.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("server thread panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lavavu_core::{Session, SessionConfig, SessionMode};
    use tower::ServiceExt;

    fn router(session: &Session) -> Router {
        create_router(Arc::new(AppState {
            session: session.downgrade(),
            static_path: None,
        }))
    }

    #[tokio::test]
    async fn test_missing_file_keeps_headers() {
        let session =
            Session::new(SessionConfig::default().with_mode(SessionMode::Thread)).unwrap();
        let response = router(&session)
            .oneshot(Request::get("/no/such/file.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_dropped_session_answers_empty() {
        let session =
            Session::new(SessionConfig::default().with_mode(SessionMode::Thread)).unwrap();
        let app = router(&session);
        drop(session);
        let response = app
            .oneshot(Request::get("/getstate").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
