//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the replay handler on every path
//! - Wire up middleware (tracing, timeout)
//! - Read the live request body for POST/PUT matching
//! - Bind server to listener, stop on the shutdown broadcast

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{AuthConfig, DumpConfig};
use crate::observability::metrics;
use crate::replay::index::is_mutating;
use crate::replay::{IgnoreKeys, IndexError, ReplayError, ReplayIndex, Replayer};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no fixture directory was configured.
    pub replayer: Option<Arc<Replayer>>,
    pub max_body_bytes: usize,
}

/// HTTP server answering requests from recorded exchanges.
pub struct HttpServer {
    router: Router,
    config: DumpConfig,
    auth: Option<AuthConfig>,
}

impl HttpServer {
    /// Build the replay index from `config.replay.dir` and the router around it.
    ///
    /// Any unreadable or corrupt fixture fails construction.
    pub fn new(config: DumpConfig) -> Result<Self, IndexError> {
        let replayer = match &config.replay.dir {
            Some(dir) => {
                let index = ReplayIndex::build(dir)?;
                let filter = IgnoreKeys::new(config.replay.ignored_query_keys.iter().cloned());
                Some(Arc::new(Replayer::new(index).with_filter(filter)))
            }
            None => {
                tracing::warn!("No fixture directory configured, every request will fail");
                None
            }
        };
        Ok(Self::from_replayer(replayer, config))
    }

    /// Serve an already built replayer.
    pub fn from_replayer(replayer: Option<Arc<Replayer>>, config: DumpConfig) -> Self {
        let state = AppState {
            replayer,
            max_body_bytes: config.replay.max_body_bytes,
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            auth: config.auth.clone(),
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DumpConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(replay_handler))
            .route("/", any(replay_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.replay.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Record credentials for the server. They are stored, not checked.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(AuthConfig {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref()
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Replay server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Replay server stopped");
        Ok(())
    }
}

/// Answers every request from the recordings.
async fn replay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let Some(replayer) = state.replayer.as_deref() else {
        let err = ReplayError::NotConfigured;
        metrics::record_replay(err.kind(), err.status().as_u16());
        return err.into_response();
    };

    let (parts, body) = request.into_parts();
    let body = if is_mutating(&parts.method) {
        match axum::body::to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %e,
                    "Failed to read request body"
                );
                metrics::record_replay("body_unreadable", StatusCode::BAD_REQUEST.as_u16());
                return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
            }
        }
    } else {
        Bytes::new()
    };

    match replayer.replay(&parts.method, &parts.uri, &body) {
        Ok(replayed) => {
            tracing::debug!(
                method = %parts.method,
                uri = %parts.uri,
                status = replayed.status.as_u16(),
                elapsed = ?start_time.elapsed(),
                "Replayed recorded response"
            );
            metrics::record_replay("ok", replayed.status.as_u16());
            replayed.into_response()
        }
        Err(err) => {
            tracing::info!(
                method = %parts.method,
                uri = %parts.uri,
                error = %err,
                "No recorded response"
            );
            metrics::record_replay(err.kind(), err.status().as_u16());
            err.into_response()
        }
    }
}
