use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::ApiResponse;
use crate::models::{Trade, TradeState};
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<Trade>>> {
    let trades = state.orchestrator.trades_snapshot().await;
    Json(ApiResponse::ok(trades))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse<Trade>>) {
    match state.orchestrator.trade(id).await {
        Some(trade) => (StatusCode::OK, Json(ApiResponse::ok(trade))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("trade {id} not found"))),
        ),
    }
}

pub async fn exit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse<TradeState>>) {
    match state.orchestrator.request_manual_exit(id).await {
        Some(trade_state) => (StatusCode::OK, Json(ApiResponse::ok(trade_state))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("trade {id} not found"))),
        ),
    }
}
