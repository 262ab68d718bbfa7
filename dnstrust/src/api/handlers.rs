//! API request handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::routes::AppState;
use crate::config::PolicyDomain;
use crate::ebpf_loader::TrustEntry;
use crate::metrics;

// ============== Response types ==============

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn ok_message(msg: &str) -> Self {
        ApiResponse {
            success: true,
            data: None,
            message: Some(msg.to_string()),
        }
    }

    pub fn error(msg: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: Some(msg.to_string()),
        }
    }
}

// ============== Health check ==============

pub async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

// ============== Metrics ==============

pub async fn metrics() -> String {
    crate::metrics::export_metrics()
}

// ============== Configuration ==============

pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<crate::config::Config>> {
    let config = state.config.read().await;
    Json(ApiResponse::success(config.clone()))
}

// ============== eBPF status ==============

#[derive(Serialize)]
pub struct EbpfStatus {
    pub hook_type: String,
    pub interfaces: Vec<String>,
    pub uptime_seconds: u64,
    pub policy_domains: usize,
    pub trust_entries: usize,
    pub stats: crate::ebpf_loader::InspectStats,
}

pub async fn ebpf_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<EbpfStatus>> {
    let ebpf = state.ebpf.read().await;
    let index = state.trust_index.read().await;

    let status = EbpfStatus {
        hook_type: ebpf.hook_type().to_string(),
        interfaces: ebpf.interfaces().to_vec(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        policy_domains: index.domain_count(),
        trust_entries: ebpf.trust_entry_count(),
        stats: ebpf.stats().unwrap_or_default(),
    };

    Json(ApiResponse::success(status))
}

pub async fn list_interfaces(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<String>>> {
    let ebpf = state.ebpf.read().await;
    Json(ApiResponse::success(ebpf.interfaces().to_vec()))
}

// ============== Policy domains ==============

pub async fn get_policy(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<PolicyDomain>>> {
    let index = state.trust_index.read().await;
    Json(ApiResponse::success(index.domains().to_vec()))
}

pub async fn add_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PolicyDomain>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let mut index = state.trust_index.write().await;
    index.add(&req).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(&e.to_string())),
        )
    })?;

    // Push the new keys into the kernel trie.
    let mut ebpf = state.ebpf.write().await;
    ebpf.sync_index(&index).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(&e.to_string())),
        )
    })?;

    let mut config = state.config.write().await;
    if !config.policy.contains(&req) {
        config.policy.push(req.clone());
    }

    metrics::POLICY_DOMAINS.set(index.domain_count() as i64);

    Ok(Json(ApiResponse::ok_message(&format!(
        "Domain {} registered for set {}",
        req.domain, req.set_id
    ))))
}

pub async fn remove_policy(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    let mut index = state.trust_index.write().await;
    index.remove(&domain);

    let mut ebpf = state.ebpf.write().await;
    ebpf.sync_index(&index).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(&e.to_string())),
        )
    })?;

    let mut config = state.config.write().await;
    config.policy.retain(|p| p.domain != domain);

    metrics::POLICY_DOMAINS.set(index.domain_count() as i64);

    Ok(Json(ApiResponse::ok_message(&format!(
        "Domain {} removed",
        domain
    ))))
}

// ============== Trust-set table ==============

pub async fn get_trust_entries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<TrustEntry>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let ebpf = state.ebpf.read().await;
    let entries = ebpf.trust_entries().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(&e.to_string())),
        )
    })?;
    Ok(Json(ApiResponse::success(entries)))
}

#[derive(Serialize)]
pub struct MatchResult {
    pub domain: String,
    pub set_id: Option<u64>,
}

/// Answers "which policy set would this name land in" using the
/// userland reference matcher.
pub async fn match_domain(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Json<ApiResponse<MatchResult>> {
    let index = state.trust_index.read().await;
    let set_id = index.longest_match(&domain);
    Json(ApiResponse::success(MatchResult { domain, set_id }))
}
