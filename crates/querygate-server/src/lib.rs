mod audit;
mod engine;
mod error;
mod gateway;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use querygate_config::{Config, UnconfiguredPolicy};
use querygate_contracts::{
    ChartResponse, ChatRequest, LogsResponse, NormalizedResponse, API_KEY_HEADER,
};
use querygate_kernel::AccessPolicy;
use tower_http::trace::TraceLayer;

pub use audit::{read_latest_log, verify_audit_chain, AuditJsonl, AuditRecord};
pub use engine::{ChartEngine, ConversationEngine, EngineError, HttpEngine};
pub use error::ApiError;
pub use gateway::{ChartGateway, ChatGateway};

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "querygate listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub struct Engines {
    pub conversation: Arc<dyn ConversationEngine>,
    pub chart: Arc<dyn ChartEngine>,
}

impl Engines {
    pub fn http(cfg: &Config) -> Result<Self, String> {
        let timeout = Duration::from_millis(cfg.engine.timeout_ms);
        Ok(Self {
            conversation: Arc::new(HttpEngine::new(&cfg.engine.conversation_endpoint, timeout)?),
            chart: Arc::new(HttpEngine::new(&cfg.engine.chart_endpoint, timeout)?),
        })
    }
}

pub fn build_app(cfg: Config) -> Result<Router, String> {
    let engines = Engines::http(&cfg)?;
    Ok(build_app_with_engines(cfg, engines))
}

pub fn build_app_with_engines(cfg: Config, engines: Engines) -> Router {
    let state = AppState::new(&cfg, engines);
    let api = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/charts", post(charts))
        .route("/api/logs", get(logs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));
    Router::new()
        .route("/", get(index_page))
        .route("/charts", get(charts_page))
        .route("/logs", get(logs_page))
        .route("/healthz", get(healthz))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    access: Arc<AccessPolicy>,
    chat: Arc<ChatGateway>,
    chart: Arc<ChartGateway>,
    log_dir: PathBuf,
}

impl AppState {
    fn new(cfg: &Config, engines: Engines) -> Self {
        let access = AccessPolicy::new(
            cfg.auth.api_key.clone(),
            cfg.auth.unconfigured_policy == UnconfiguredPolicy::Allow,
        );
        if !access.is_configured() {
            match cfg.auth.unconfigured_policy {
                UnconfiguredPolicy::Allow => tracing::warn!(
                    env = %cfg.auth.api_key_env,
                    "API key not set; authentication disabled (unauthenticated mode)"
                ),
                UnconfiguredPolicy::Deny => tracing::warn!(
                    env = %cfg.auth.api_key_env,
                    "API key not set; every /api request will be rejected"
                ),
            }
        }

        let log_dir = PathBuf::from(&cfg.audit.log_dir);
        let audit = Arc::new(AuditJsonl::new(&log_dir));
        let deadline = Duration::from_millis(cfg.engine.timeout_ms);
        Self {
            access: Arc::new(access),
            chat: Arc::new(ChatGateway::new(engines.conversation, audit.clone(), deadline)),
            chart: Arc::new(ChartGateway::new(engines.chart, audit, deadline)),
            log_dir,
        }
    }
}

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match state.access.admit(presented) {
        Ok(()) => next.run(req).await,
        Err(_) => ApiError::Forbidden.into_response(),
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn index_page() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

async fn charts_page() -> Html<&'static str> {
    Html(include_str!("../assets/charts.html"))
}

async fn logs_page() -> Html<&'static str> {
    Html(include_str!("../assets/logs.html"))
}

// Each pipeline runs on its own task so a dropped connection cannot skip the
// audit record.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<NormalizedResponse>, ApiError> {
    let gateway = state.chat.clone();
    tokio::spawn(async move { gateway.handle(request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
}

async fn charts(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChartResponse>, ApiError> {
    let gateway = state.chart.clone();
    tokio::spawn(async move { gateway.handle(request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
}

async fn logs(State(state): State<AppState>) -> Result<Json<LogsResponse>, ApiError> {
    read_latest_log(&state.log_dir).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, dir = %state.log_dir.display(), "reading audit logs failed");
        ApiError::LogRead(e.to_string())
    })
}
