//! HTTP surface of the macro dashboard: cached indicator narratives,
//! portfolio advice and the read-only dashboard views.

pub mod config;
mod dashboard_routes;
mod insight_routes;
mod narrative_routes;
mod portfolio_routes;
mod request_id;


use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use insight_core::{AdvisoryStore, DailyWindow, InsightError, InsightStore};
use insight_engine::{AdvisoryHandler, IndicatorInsightHandler, TakeawaysGenerator};
use insight_store::{MemoryInsightStore, SqlInsightStore};
use llm_client::{AnthropicClient, DeepSeekClient, LlmBackend};
use postgrest_client::PostgrestClient;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::AppConfig;

const DATA_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub data: Arc<PostgrestClient>,
    pub insights: IndicatorInsightHandler,
    /// Absent when no Anthropic key is configured
    pub advisory: Option<AdvisoryHandler>,
    pub takeaways: Option<TakeawaysGenerator>,
    pub store: Arc<dyn InsightStore>,
}

impl AppState {
    /// Wire handlers around one store that serves both caches.
    pub fn assemble<S>(
        data: PostgrestClient,
        store: Arc<S>,
        indicator_backend: Arc<dyn LlmBackend>,
        narrative_backend: Option<Arc<dyn LlmBackend>>,
        window: DailyWindow,
    ) -> Self
    where
        S: InsightStore + AdvisoryStore + 'static,
    {
        let data = Arc::new(data);
        let insight_store: Arc<dyn InsightStore> = store.clone();
        let advisory_store: Arc<dyn AdvisoryStore> = store;

        let insights = IndicatorInsightHandler::new(
            data.clone(),
            insight_store.clone(),
            indicator_backend,
            window,
        );
        let advisory = narrative_backend
            .clone()
            .map(|backend| AdvisoryHandler::new(data.clone(), advisory_store, backend));
        let takeaways = narrative_backend.map(TakeawaysGenerator::new);

        Self {
            data,
            insights,
            advisory,
            takeaways,
            store: insight_store,
        }
    }

    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let data = PostgrestClient::new(
            &config.supabase_url,
            &config.supabase_service_key,
            DATA_SOURCE_TIMEOUT,
        );
        let window = DailyWindow::from_name(&config.window_tz)?;

        let indicator_backend: Arc<dyn LlmBackend> = Arc::new(DeepSeekClient::new(
            &config.deepseek_api_key,
            &config.deepseek_base_url,
            config.llm_timeout,
        ));
        let narrative_backend: Option<Arc<dyn LlmBackend>> =
            config.anthropic_api_key.as_ref().map(|key| {
                Arc::new(AnthropicClient::new(key, config.llm_timeout)) as Arc<dyn LlmBackend>
            });
        if narrative_backend.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY not set; advisory and takeaways are disabled");
        }

        let state = if config.uses_memory_store() {
            tracing::warn!("Using in-process insight store; records are lost on restart");
            Self::assemble(
                data,
                Arc::new(MemoryInsightStore::new()),
                indicator_backend,
                narrative_backend,
                window,
            )
        } else {
            let store = SqlInsightStore::connect(&config.database_url).await?;
            Self::assemble(
                data,
                Arc::new(store),
                indicator_backend,
                narrative_backend,
                window,
            )
        };
        Ok(state)
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error returned by route handlers. Domain errors pick their own status;
/// everything else is a 500.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

pub(crate) fn status_for(error: &InsightError) -> StatusCode {
    match error {
        InsightError::NotFound(_) => StatusCode::NOT_FOUND,
        InsightError::InvalidData(_) => StatusCode::BAD_REQUEST,
        InsightError::DataSource(_) | InsightError::Generation(_) => StatusCode::BAD_GATEWAY,
        InsightError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        InsightError::Store(_) | InsightError::Consistency(_) | InsightError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = error
            .downcast_ref::<InsightError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {:#}", self.error);
        } else {
            tracing::debug!(status = %self.status, "Request rejected: {}", self.error);
        }
        (self.status, Json(ApiResponse::<()>::error(self.error.to_string()))).into_response()
    }
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    store: &'static str,
    store_connected: bool,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let store_connected = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Store health probe failed");
            false
        }
    };

    let status = if store_connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthReport {
            status: if store_connected { "ok" } else { "degraded" },
            store: state.store.backend_name(),
            store_connected,
        }),
    )
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(insight_routes::insight_routes())
        .merge(narrative_routes::narrative_routes())
        .merge(dashboard_routes::dashboard_routes())
        .merge(portfolio_routes::portfolio_routes())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let state = AppState::from_config(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
