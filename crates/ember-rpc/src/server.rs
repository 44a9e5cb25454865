//! HTTP server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::error::{ApiError, ApiResult};
use crate::types::{PeerDirectory, PeerDispatch, VersionInfo};

/// Cap on the peer list answered by `GET /api/peers`
pub const MAX_PEERS_LISTED: usize = 100;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address (conventionally the overlay port minus one)
    pub listen_addr: SocketAddr,
    /// Maximum request body size
    pub max_body_size: usize,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6999".parse().unwrap(),
            max_body_size: 1024 * 1024,
            enable_cors: true,
        }
    }
}

struct ApiState {
    magic: String,
    version: VersionInfo,
    directory: Arc<dyn PeerDirectory>,
    dispatch: Arc<dyn PeerDispatch>,
}

/// The peer HTTP server
pub struct PeerApiServer {
    config: ApiConfig,
    state: Arc<ApiState>,
}

impl PeerApiServer {
    /// Create a server
    pub fn new(
        config: ApiConfig,
        magic: String,
        version: VersionInfo,
        directory: Arc<dyn PeerDirectory>,
        dispatch: Arc<dyn PeerDispatch>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(ApiState {
                magic,
                version,
                directory,
                dispatch,
            }),
        }
    }

    fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/peer/:method", post(handle_peer_method))
            .route("/api/peers", get(handle_peers))
            .route("/api/peers/version", get(handle_version))
            .route("/api/p2phelper", post(handle_p2phelper))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(self.config.max_body_size)),
            );

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router.with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the process exits
    pub async fn run(self) -> ApiResult<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        tracing::info!("peer API listening on {}", self.config.listen_addr);
        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> ApiResult<()> {
        let app = self.build_router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| ApiError::Serve(e.to_string()))
    }
}

/// `POST /peer/<method>`: magic- and version-gated dispatch into the
/// node's method registry
async fn handle_peer_method(
    State(state): State<Arc<ApiState>>,
    Path(method): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };
    if header("magic") != state.magic {
        return Err(StatusCode::FORBIDDEN);
    }
    if !ember_network::is_compatible(header("version"), state.version.net) {
        return Err(StatusCode::FORBIDDEN);
    }

    match state.dispatch.dispatch(&method, params).await {
        Some(result) => Ok(Json(result)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// `GET /api/peers`: up to [`MAX_PEERS_LISTED`] known peers
async fn handle_peers(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let peers = state.directory.known_peers(MAX_PEERS_LISTED);
    Json(json!({ "peers": peers }))
}

/// `GET /api/peers/version`
async fn handle_version(State(state): State<Arc<ApiState>>) -> Json<VersionInfo> {
    Json(state.version.clone())
}

/// `POST /api/p2phelper`: echo the observed remote IP for self-IP
/// discovery
async fn handle_p2phelper(
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(_state): State<Arc<ApiState>>,
) -> Json<Value> {
    Json(json!({ "ip": remote.ip().to_string() }))
}
