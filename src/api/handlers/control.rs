use axum::extract::State;
use axum::Json;
use std::sync::atomic::Ordering;

use super::ApiResponse;
use crate::AppState;

pub async fn pause(State(state): State<AppState>) -> Json<ApiResponse<&'static str>> {
    state.pause_flag.store(true, Ordering::Relaxed);
    tracing::warn!("Execution paused by operator");
    Json(ApiResponse::ok("paused"))
}

pub async fn resume(State(state): State<AppState>) -> Json<ApiResponse<&'static str>> {
    state.pause_flag.store(false, Ordering::Relaxed);
    tracing::info!("Execution resumed by operator");
    Json(ApiResponse::ok("resumed"))
}
