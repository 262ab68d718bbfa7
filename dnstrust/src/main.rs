//! dnstrust - kernel-resident DNS response inspector and trust-set
//! updater.
//!
//! A TC or XDP program watches DNS responses, matches query names
//! against registered policy domains, and publishes the answered IP
//! addresses into a shared trust-set table the policy engine consumes.
//! This daemon loads the program, owns the domain index, and serves the
//! control API.

mod api;
mod config;
mod ebpf_loader;
mod event_handler;
mod metrics;
mod trust_index;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use api::routes::{create_router, AppState};
use config::Config;
use ebpf_loader::EbpfManager;
use trust_index::TrustIndex;

/// eBPF-based DNS response inspector and trust-set updater
#[derive(Parser, Debug)]
#[command(name = "dnstrust", version, about, long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Network interfaces to attach (comma-separated, overrides config)
    #[arg(short, long, value_delimiter = ',')]
    interfaces: Option<Vec<String>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Drains telemetry events from the kernel ring buffer.
async fn run_event_processor(ebpf: Arc<RwLock<EbpfManager>>) -> Result<()> {
    let mut ring_buf = {
        let mut ebpf_guard = ebpf.write().await;
        ebpf_guard.take_ring_buf().context("Failed to get RingBuf")?
    };
    event_handler::run_event_loop(&mut ring_buf).await
}

/// Periodically mirrors kernel counters into the exported gauges.
async fn run_stats_exporter(ebpf: Arc<RwLock<EbpfManager>>, start_time: std::time::Instant) {
    loop {
        {
            let ebpf_guard = ebpf.read().await;
            if let Ok(stats) = ebpf_guard.stats() {
                metrics::update_inspect_stats(&stats);
            }
            metrics::TRUST_ENTRIES.set(ebpf_guard.trust_entry_count() as i64);
        }
        metrics::update_uptime(start_time);
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    // 2. Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("dnstrust starting...");
    info!("Config loaded from {}", args.config);

    // 3. Register metrics
    metrics::register_metrics();

    // 4. Load the eBPF program
    info!("Loading eBPF program...");
    let mut ebpf = EbpfManager::load(&config).context("Failed to load eBPF program")?;

    // 5. Attach to interfaces
    let interfaces = args.interfaces.as_ref().unwrap_or(&config.interfaces);
    info!("Attaching to interfaces: {:?}", interfaces);
    ebpf.attach(interfaces)
        .context("Failed to attach eBPF program")?;

    // 6. Compile the policy domains and push them into the kernel trie
    info!("Compiling trust index ({} domains)...", config.policy.len());
    let trust_index =
        TrustIndex::compile(&config.policy).context("Failed to compile trust index")?;
    ebpf.sync_index(&trust_index)
        .context("Failed to sync trust index")?;

    metrics::POLICY_DOMAINS.set(trust_index.domain_count() as i64);

    // 7. Shared state
    let start_time = std::time::Instant::now();
    let config = Arc::new(RwLock::new(config));
    let ebpf = Arc::new(RwLock::new(ebpf));
    let trust_index = Arc::new(RwLock::new(trust_index));

    let state = Arc::new(AppState {
        config: config.clone(),
        ebpf: ebpf.clone(),
        trust_index: trust_index.clone(),
        start_time,
    });

    // 8. HTTP API
    let app = create_router(state);

    let http_addr = {
        let cfg = config.read().await;
        cfg.server.http_addr.clone()
    };

    info!("Starting HTTP server on {}", http_addr);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", http_addr))?;

    // 9. Concurrent tasks
    info!("dnstrust is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                log::error!("HTTP server error: {}", e);
            }
        }

        result = run_event_processor(ebpf.clone()) => {
            if let Err(e) = result {
                log::error!("Event processor error: {}", e);
            }
        }

        _ = run_stats_exporter(ebpf.clone(), start_time) => {}

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("dnstrust stopped.");
    Ok(())
}
