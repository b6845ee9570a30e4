//! # Authorization Sidecar Server
//!
//! HTTP surface over the console authorization engine, for routing layers
//! that run out of process.
//!
//! ## Endpoints
//!
//! - `POST /v1/authorize` - Allow/deny for `(principal, method, path)`
//! - `POST /v1/resolve` - Menu tree and button/API codes for UI rendering
//! - `POST /v1/invalidate` - Cache invalidation hook for the CRUD layer
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Configuration
//!
//! `--config <path>` (or `AUTHZ_CONFIG`) points at a TOML file; see
//! `console_authz::config` for the environment overrides. `RUST_LOG`
//! controls log level (default: info).

use anyhow::{bail, Context};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use clap::Parser;
use console_authz::{
    config::AuthzConfig,
    store::InMemoryGraphStore,
    tree::MenuView,
    types::{RoleId, UserId},
    Authorizer, ButtonPolicy, PermissionCache, PermissionGraphStore, PermissionResolver,
    Principal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Console authorization sidecar
#[derive(Debug, Parser)]
#[command(name = "authz-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "AUTHZ_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    authorizer: Arc<Authorizer>,
    button_policy: ButtonPolicy,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            // Internal detail stays in the logs
            AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "permission data is temporarily unavailable".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<console_authz::AuthzError> for AppError {
    fn from(err: console_authz::AuthzError) -> Self {
        error!("Request failed: {}", err);
        AppError::Unavailable
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizeRequest {
    principal: Principal,
    method: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct AuthorizeResponse {
    allowed: bool,
    decision: String,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    principal: Principal,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    menus: Vec<MenuView>,
    button_codes: BTreeSet<String>,
    api_codes: BTreeSet<String>,
    fingerprint: String,
    button_policy: ButtonPolicy,
}

#[derive(Debug, Default, Deserialize)]
struct InvalidateRequest {
    #[serde(default)]
    principal_id: Option<UserId>,
    #[serde(default)]
    role_id: Option<RoleId>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    scope: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    principals: Option<usize>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
    cache_backend: String,
}

/// Metrics response (Prometheus format)
struct MetricsResponse {
    metrics: String,
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            self.metrics,
        )
            .into_response()
    }
}

/// POST /v1/authorize
async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Json<AuthorizeResponse> {
    let decision = state
        .authorizer
        .authorize(&req.principal, &req.method, &req.path)
        .await;

    Json(AuthorizeResponse {
        allowed: decision.is_allowed(),
        decision: decision.to_string(),
    })
}

/// POST /v1/resolve
async fn resolve(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let bundle = state.authorizer.resolve(&req.principal).await?;

    Ok(Json(ResolveResponse {
        menus: bundle.menu_tree.to_nested(),
        fingerprint: bundle.fingerprint(),
        button_codes: bundle.button_codes,
        api_codes: bundle.api_codes,
        button_policy: state.button_policy,
    }))
}

/// POST /v1/invalidate
async fn invalidate(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, AppError> {
    let resolver = state.authorizer.resolver();

    let response = match (req.principal_id, req.role_id) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest(
                "specify principal_id or role_id, not both".to_string(),
            ))
        }
        (Some(principal_id), None) => {
            resolver.invalidate(principal_id).await;
            InvalidateResponse {
                scope: "principal",
                principals: Some(1),
            }
        }
        (None, Some(role_id)) => {
            let principals = resolver.invalidate_role(role_id).await;
            InvalidateResponse {
                scope: if principals.is_some() { "role" } else { "all" },
                principals,
            }
        }
        (None, None) => {
            resolver.invalidate_all().await;
            InvalidateResponse {
                scope: "all",
                principals: None,
            }
        }
    };

    Ok(Json(response))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: console_authz::VERSION.to_string(),
        cache_backend: state.authorizer.resolver().cache().backend_name().to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> MetricsResponse {
    let uptime = state.start_time.elapsed().as_secs();

    let metrics = format!(
        "# HELP authz_uptime_seconds Server uptime in seconds\n\
         # TYPE authz_uptime_seconds gauge\n\
         authz_uptime_seconds {}\n\
         \n\
         {}",
        uptime,
        state.authorizer.export_metrics().await
    );

    MetricsResponse { metrics }
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/authorize", post(authorize))
        .route("/v1/resolve", post(resolve))
        .route("/v1/invalidate", post(invalidate))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

/// Build the permission graph store from configuration
async fn build_store(config: &AuthzConfig) -> anyhow::Result<Arc<dyn PermissionGraphStore>> {
    if let Some(url) = &config.store.database_url {
        #[cfg(feature = "postgres")]
        {
            let store = console_authz::store::PostgresGraphStore::new(
                url,
                config.store.max_connections,
            )
            .await
            .context("connecting to the permission database")?;

            info!("Using PostgreSQL permission store");
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "postgres"))]
        {
            let _ = url;
            bail!("store.database_url is set but the `postgres` feature is disabled");
        }
    }

    if let Some(path) = &config.store.snapshot_path {
        let store = InMemoryGraphStore::from_json_file(path)
            .with_context(|| format!("loading graph snapshot {}", path.display()))?;

        info!("Using snapshot permission store from {}", path.display());
        return Ok(Arc::new(store));
    }

    warn!("No permission store configured; every protected endpoint will deny");
    Ok(Arc::new(InMemoryGraphStore::new()))
}

fn load_config(cli: &Cli) -> anyhow::Result<AuthzConfig> {
    let mut config = match &cli.config {
        Some(path) => AuthzConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AuthzConfig::default(),
    };

    config
        .apply_env_overrides()
        .context("applying environment overrides")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting console authorization server v{}", console_authz::VERSION);

    let config = load_config(&cli)?;

    info!("Configuration:");
    info!("  Cache backend: {:?}", config.cache.backend);
    info!("  Cache TTL: {}s", config.cache.ttl_secs);
    info!("  Button policy: {}", config.ui.button_policy);
    info!("  Public endpoints: {}", config.public_endpoints.len());

    let store = build_store(&config).await?;
    let cache = PermissionCache::from_config(&config.cache)
        .await
        .context("initializing permission cache")?;

    let resolver = PermissionResolver::new(store, Arc::new(cache))
        .with_coalescing(config.cache.coalesce_misses);

    let authorizer = Authorizer::new(Arc::new(resolver))
        .with_public_endpoints(&config.public_endpoints)
        .context("parsing public endpoints")?;

    let state = AppState {
        authorizer: Arc::new(authorizer),
        button_policy: config.ui.button_policy,
        start_time: std::time::Instant::now(),
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("Listening on {}", addr);

    if let Err(e) = serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        bail!("server error: {}", e);
    }

    info!("Server shut down gracefully");
    Ok(())
}
