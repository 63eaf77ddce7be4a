use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use insight_core::InsightStatus;
use serde::{Deserialize, Serialize};

use crate::{status_for, AppState};

#[derive(Deserialize)]
pub struct InsightRequest {
    #[serde(default)]
    pub code: String,
}

/// Failure body in the same shape pollers read for terminal records
#[derive(Serialize)]
struct InsightFailure {
    status: InsightStatus,
    error_message: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(InsightFailure {
            status: InsightStatus::Error,
            error_message: message.into(),
        }),
    )
        .into_response()
}

pub fn insight_routes() -> Router<AppState> {
    Router::new().route("/api/indicator-insight", post(indicator_insight))
}

/// Returns the record for the current window (`pending`, `done` or `error`)
/// directly, without the `ApiResponse` envelope.
async fn indicator_insight(
    State(state): State<AppState>,
    Json(req): Json<InsightRequest>,
) -> Response {
    let code = req.code.trim();
    if code.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Missing indicator code");
    }

    match state.insights.handle(code).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(code, error = %e, "Indicator insight failed");
            }
            failure(status, e.to_string())
        }
    }
}
