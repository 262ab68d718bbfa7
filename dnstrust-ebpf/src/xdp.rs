#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::{xdp_action, BPF_F_NO_PREALLOC},
    macros::{map, xdp},
    maps::{HashMap, LpmTrie, PerCpuArray, RingBuf},
    programs::XdpContext,
};

#[path = "common.rs"]
mod common;
use common::inspect_packet;

use dnstrust_common::{InspectScratch, TrustKey, NAME_BUF, STAT_MAX};

/// Reverse-Name Trust Index: reversed domain-name key -> policy-set id.
/// Written by the daemon, longest-prefix matched here.
#[map]
static DNS_PFX: LpmTrie<[u8; NAME_BUF], u64> = LpmTrie::with_max_entries(10240, BPF_F_NO_PREALLOC);

/// Trust-Set table: (policy-set id, family-qualified IP) -> last seen ns.
/// Read by the policy engine; inserted into here, never deleted.
#[map]
static TRUST_SETS: HashMap<TrustKey, u64> = HashMap::with_max_entries(65536, 0);

/// Per-CPU scratch arena for staged payload bytes and decoded names.
#[map]
static SCRATCH: PerCpuArray<InspectScratch> = PerCpuArray::with_max_entries(1, 0);

/// Per-CPU inspection counters, indexed by the STAT_* constants.
#[map]
static DNS_STATS: PerCpuArray<u64> = PerCpuArray::with_max_entries(STAT_MAX, 0);

/// Telemetry events for matched exchanges.
#[map]
static DNS_EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

#[xdp]
pub fn dnstrust_xdp(ctx: XdpContext) -> u32 {
    // DNS responses arrive inbound, so ingress-only XDP sees everything
    // this component cares about. Observation only, always pass.
    inspect_packet(
        ctx.data(),
        ctx.data_end(),
        &DNS_PFX,
        &TRUST_SETS,
        &SCRATCH,
        &DNS_STATS,
        &DNS_EVENTS,
    );
    xdp_action::XDP_PASS
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
