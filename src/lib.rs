pub mod amount;
pub mod api;
pub mod cache;
pub mod chain;
pub mod clients;
pub mod config;
pub mod errors;
pub mod execution;
pub mod flow;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod retry;
pub mod services;

use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::execution::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    /// Global pause flag — when true, the scheduler defers queue draining.
    pub pause_flag: Arc<AtomicBool>,
    pub started_at: DateTime<Utc>,
}
