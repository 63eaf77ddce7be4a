use axum::{extract::State, routing::get, Json, Router};
use insight_core::{CreditStress, MacroSnapshot};
use insight_engine::credit_stress;
use postgrest_client::dashboard::CREDIT_HISTORY_ROWS;
use postgrest_client::ExplainFeature;

use crate::{ApiResponse, AppError, AppState};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/macro-snapshot", get(get_macro_snapshot))
        .route("/api/explain", get(get_explain))
        .route("/api/credit-stress", get(get_credit_stress))
}

async fn get_macro_snapshot(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MacroSnapshot>>, AppError> {
    let snapshot = state.data.macro_snapshot().await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn get_explain(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ExplainFeature>>>, AppError> {
    let rows = state.data.explain_features().await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn get_credit_stress(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CreditStress>>, AppError> {
    let rows = state.data.credit_gap_history(CREDIT_HISTORY_ROWS).await?;
    Ok(Json(ApiResponse::success(credit_stress(rows))))
}
