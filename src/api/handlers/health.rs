use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::Ordering;

use super::ApiResponse;
use crate::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub networks: usize,
    pub live_execution: bool,
    pub paused: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Health>> {
    Json(ApiResponse::ok(Health {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        networks: state.config.networks.len(),
        live_execution: state.config.has_private_key() && !state.config.dry_run,
        paused: state.pause_flag.load(Ordering::Relaxed),
    }))
}
