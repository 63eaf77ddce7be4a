use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use insight_core::DataSource;
use insight_engine::{group_portfolio, GroupedPortfolio};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize)]
pub struct UpdateUnitsRequest {
    pub code: String,
    pub account: String,
    pub new_quantity: f64,
}

#[derive(Serialize)]
pub struct UpdateUnitsReply {
    pub code: String,
    pub account: String,
    pub quantity: f64,
}

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        .route("/api/portfolio", get(get_portfolio))
        .route("/api/portfolio/update-units", post(update_units))
}

async fn get_portfolio(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<GroupedPortfolio>>, AppError> {
    let positions = state.data.valued_positions().await?;
    Ok(Json(ApiResponse::success(group_portfolio(positions))))
}

async fn update_units(
    State(state): State<AppState>,
    Json(req): Json<UpdateUnitsRequest>,
) -> Result<Json<ApiResponse<UpdateUnitsReply>>, AppError> {
    if req.code.trim().is_empty() || req.account.trim().is_empty() {
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("Both code and account are required"),
        ));
    }
    if !req.new_quantity.is_finite() || req.new_quantity < 0.0 {
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("Quantity must be a non-negative number"),
        ));
    }

    let target = state.data.resolve_position(&req.code, &req.account).await?;
    state
        .data
        .update_position_quantity(&target, req.new_quantity)
        .await?;

    tracing::info!(
        code = %req.code,
        account = %req.account,
        quantity = req.new_quantity,
        "Updated position units"
    );
    Ok(Json(ApiResponse::success(UpdateUnitsReply {
        code: req.code,
        account: req.account,
        quantity: req.new_quantity,
    })))
}
