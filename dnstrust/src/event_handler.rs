//! Telemetry event drain.
//!
//! The dataplane emits one event per matched DNS exchange; this loop
//! drains them, updates metrics, and logs the exchange.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::Result;
use aya::maps::{MapData, RingBuf};
use log::{info, warn};

use crate::metrics;
use dnstrust_common::{DnsExchangeEvent, FAMILY_V6, OUTCOME_TRUNCATED};

pub async fn run_event_loop(ring_buf: &mut RingBuf<MapData>) -> Result<()> {
    info!("Starting telemetry event handler...");

    loop {
        while let Some(item) = ring_buf.next() {
            let data: &[u8] = item.as_ref();

            if data.len() < std::mem::size_of::<DnsExchangeEvent>() {
                warn!("Received malformed telemetry event ({} bytes)", data.len());
                continue;
            }

            let event: &DnsExchangeEvent = unsafe { &*(data.as_ptr() as *const DnsExchangeEvent) };
            process_event(event);
        }

        // Avoid busy-waiting between bursts.
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
}

fn process_event(event: &DnsExchangeEvent) {
    metrics::EVENTS_RECEIVED.inc();

    let src = event_addr(&event.src_addr, event.family);
    let dst = event_addr(&event.dst_addr, event.family);

    if event.outcome == OUTCOME_TRUNCATED {
        warn!(
            "DNS exchange {} -> {}: set={} records={} published={} (walk truncated)",
            src, dst, event.set_id, event.records, event.published
        );
    } else {
        info!(
            "DNS exchange {} -> {}: set={} msg_len={} records={} published={}",
            src, dst, event.set_id, event.msg_len, event.records, event.published
        );
    }
}

/// Event addresses are carried in network byte order.
fn event_addr(words: &[u32; 4], family: u8) -> IpAddr {
    if family == FAMILY_V6 {
        let mut octets = [0u8; 16];
        for (i, word) in words.iter().enumerate() {
            octets[i * 4..i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
        }
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        IpAddr::V4(Ipv4Addr::from(u32::from_be(words[0])))
    }
}
