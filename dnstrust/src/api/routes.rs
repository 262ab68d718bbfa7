//! API routes.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::handlers;
use crate::config::Config;
use crate::ebpf_loader::EbpfManager;
use crate::trust_index::TrustIndex;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub ebpf: Arc<RwLock<EbpfManager>>,
    pub trust_index: Arc<RwLock<TrustIndex>>,
    pub start_time: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Metrics
        .route("/metrics", get(handlers::metrics))
        // Configuration
        .route("/config", get(handlers::get_config))
        // eBPF status
        .route("/ebpf/status", get(handlers::ebpf_status))
        .route("/ebpf/interfaces", get(handlers::list_interfaces))
        // Policy domains
        .route("/policy", get(handlers::get_policy))
        .route("/policy", post(handlers::add_policy))
        .route("/policy/:domain", delete(handlers::remove_policy))
        // Trust-set table
        .route("/trust", get(handlers::get_trust_entries))
        .route("/trust/match/:domain", get(handlers::match_domain))
        .with_state(state)
}
