use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use insight_engine::AdvisoryReply;
use serde::Serialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Serialize)]
pub struct TakeawaysReply {
    pub bullets: Vec<String>,
}

pub fn narrative_routes() -> Router<AppState> {
    Router::new()
        .route("/api/advice/generate", post(generate_advice))
        .route("/api/generate-takeaways", post(generate_takeaways))
}

fn unconfigured(feature: &str) -> AppError {
    AppError::with_status(
        StatusCode::SERVICE_UNAVAILABLE,
        anyhow::anyhow!("{feature} is unavailable: ANTHROPIC_API_KEY not configured"),
    )
}

async fn generate_advice(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AdvisoryReply>>, AppError> {
    let advisory = state
        .advisory
        .as_ref()
        .ok_or_else(|| unconfigured("Portfolio advice"))?;

    let reply = advisory.generate().await?;
    Ok(Json(ApiResponse::success(reply)))
}

async fn generate_takeaways(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TakeawaysReply>>, AppError> {
    let generator = state
        .takeaways
        .as_ref()
        .ok_or_else(|| unconfigured("Regime takeaways"))?;

    let features = state.data.get_all_features().await?;
    let bullets = generator.generate(&features).await?;
    Ok(Json(ApiResponse::success(TakeawaysReply { bullets })))
}
