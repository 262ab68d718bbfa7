//! Prometheus metrics.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::OnceLock;

use crate::ebpf_loader::InspectStats;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

lazy_static::lazy_static! {
    /// DNS responses the dataplane classified (kernel counter).
    pub static ref RESPONSES_SEEN: IntGauge = IntGauge::new(
        "dnstrust_responses_seen_total",
        "DNS responses seen by the dataplane"
    ).unwrap();

    /// Responses rejected by the message gate (kernel counter).
    pub static ref GATE_REJECTED: IntGauge = IntGauge::new(
        "dnstrust_gate_rejected_total",
        "DNS responses rejected by the message gate"
    ).unwrap();

    /// Responses whose query name matched no registered domain.
    pub static ref NO_MATCH: IntGauge = IntGauge::new(
        "dnstrust_no_match_total",
        "DNS responses with no trust-index match"
    ).unwrap();

    /// Responses whose query name matched a registered domain.
    pub static ref MATCHED: IntGauge = IntGauge::new(
        "dnstrust_matched_total",
        "DNS responses matching a registered domain"
    ).unwrap();

    /// Addresses published into the Trust-Set table.
    pub static ref IPS_PUBLISHED: IntGauge = IntGauge::new(
        "dnstrust_ips_published_total",
        "IP addresses published to the trust-set table"
    ).unwrap();

    /// Responses the decoder gave up on (malformed or truncated walk).
    pub static ref PARSE_FAILED: IntGauge = IntGauge::new(
        "dnstrust_parse_failed_total",
        "DNS responses abandoned mid-parse"
    ).unwrap();

    /// Trust-Set table insert failures (table at capacity).
    pub static ref TABLE_FULL: IntGauge = IntGauge::new(
        "dnstrust_table_full_total",
        "Trust-set publications dropped because the table was full"
    ).unwrap();

    /// Telemetry events the kernel could not queue.
    pub static ref EVENTS_DROPPED: IntGauge = IntGauge::new(
        "dnstrust_events_dropped_total",
        "Telemetry events dropped by the kernel ring buffer"
    ).unwrap();

    /// Telemetry events drained by the daemon.
    pub static ref EVENTS_RECEIVED: IntCounter = IntCounter::new(
        "dnstrust_events_received_total",
        "Telemetry events received from the dataplane"
    ).unwrap();

    /// Current Trust-Set table population.
    pub static ref TRUST_ENTRIES: IntGauge = IntGauge::new(
        "dnstrust_trust_entries",
        "Entries currently in the trust-set table"
    ).unwrap();

    /// Registered policy domains.
    pub static ref POLICY_DOMAINS: IntGauge = IntGauge::new(
        "dnstrust_policy_domains",
        "Policy domains registered in the trust index"
    ).unwrap();

    pub static ref UPTIME_SECONDS: IntGauge = IntGauge::new(
        "dnstrust_uptime_seconds",
        "Daemon uptime in seconds"
    ).unwrap();
}

pub fn register_metrics() {
    let r = registry();

    r.register(Box::new(RESPONSES_SEEN.clone())).ok();
    r.register(Box::new(GATE_REJECTED.clone())).ok();
    r.register(Box::new(NO_MATCH.clone())).ok();
    r.register(Box::new(MATCHED.clone())).ok();
    r.register(Box::new(IPS_PUBLISHED.clone())).ok();
    r.register(Box::new(PARSE_FAILED.clone())).ok();
    r.register(Box::new(TABLE_FULL.clone())).ok();
    r.register(Box::new(EVENTS_DROPPED.clone())).ok();
    r.register(Box::new(EVENTS_RECEIVED.clone())).ok();
    r.register(Box::new(TRUST_ENTRIES.clone())).ok();
    r.register(Box::new(POLICY_DOMAINS.clone())).ok();
    r.register(Box::new(UPTIME_SECONDS.clone())).ok();
}

/// Mirrors the summed kernel counters into the exported gauges.
pub fn update_inspect_stats(stats: &InspectStats) {
    RESPONSES_SEEN.set(stats.responses_seen as i64);
    GATE_REJECTED.set(stats.gate_rejected as i64);
    NO_MATCH.set(stats.no_match as i64);
    MATCHED.set(stats.matched as i64);
    IPS_PUBLISHED.set(stats.ips_published as i64);
    PARSE_FAILED.set(stats.parse_failed as i64);
    TABLE_FULL.set(stats.table_full as i64);
    EVENTS_DROPPED.set(stats.events_dropped as i64);
}

/// Renders the registry in Prometheus text format.
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn update_uptime(start_time: std::time::Instant) {
    UPTIME_SECONDS.set(start_time.elapsed().as_secs() as i64);
}
