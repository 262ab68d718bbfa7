#![allow(unused_attributes)]

use aya_ebpf::{
    helpers::bpf_ktime_get_boot_ns,
    maps::{lpm_trie::Key, HashMap, LpmTrie, PerCpuArray, RingBuf},
};
use network_types::{
    eth::{EthHdr, EtherType},
    ip::{IpProto, Ipv4Hdr, Ipv6Hdr},
    udp::UdpHdr,
};

use dnstrust_common::{
    dns::{inspect_response, Inspection, TrustIndex, TrustSink, TrustedIp, DNS_HDR_LEN},
    DnsExchangeEvent, InspectScratch, TrustKey, DIRECTION_RESPONSE, DNS_MSG_MAX,
    EVENT_DNS_EXCHANGE, FAMILY_V4, FAMILY_V6, NAME_BUF, OUTCOME_COMPLETE, OUTCOME_TRUNCATED,
    STAT_EVENTS_DROPPED,
    STAT_GATE_REJECTED, STAT_IPS_PUBLISHED, STAT_MATCHED, STAT_NO_MATCH, STAT_PARSE_FAILED,
    STAT_RESPONSES_SEEN, STAT_TABLE_FULL,
};

pub const ETH_HDR_LEN: usize = core::mem::size_of::<EthHdr>();
pub const IPV4_HDR_LEN: usize = core::mem::size_of::<Ipv4Hdr>();
pub const IPV6_HDR_LEN: usize = core::mem::size_of::<Ipv6Hdr>();
pub const UDP_HDR_LEN: usize = core::mem::size_of::<UdpHdr>();
pub const DNS_PORT: u16 = 53;

/// Bounds-checked pointer into packet data.
#[inline(always)]
pub fn ptr_at<T>(start: usize, end: usize, offset: usize) -> Option<*const T> {
    let len = core::mem::size_of::<T>();
    if start + offset + len > end {
        return None;
    }
    Some((start + offset) as *const T)
}

/// Addresses and payload location of a UDP DNS response.
pub struct ResponseMeta {
    /// IPv4 in the first word, network byte order.
    pub src_addr: [u32; 4],
    pub dst_addr: [u32; 4],
    pub family: u8,
    pub payload: usize,
    pub payload_len: usize,
}

/// Classifies the packet down to the DNS payload. Only UDP datagrams
/// with source port 53 qualify: this component inspects responses, never
/// queries. Returns `None` for everything else.
#[inline(always)]
pub fn parse_dns_response(data: usize, data_end: usize) -> Option<ResponseMeta> {
    let eth_hdr: *const EthHdr = ptr_at(data, data_end, 0)?;
    let ether_type = unsafe { core::ptr::addr_of!((*eth_hdr).ether_type).read_unaligned() };

    let mut src_addr = [0u32; 4];
    let mut dst_addr = [0u32; 4];
    let family;
    let l4_offset;

    match ether_type {
        EtherType::Ipv4 => {
            let ipv4_hdr: *const Ipv4Hdr = ptr_at(data, data_end, ETH_HDR_LEN)?;
            let proto = unsafe { core::ptr::addr_of!((*ipv4_hdr).proto).read_unaligned() };
            if proto != IpProto::Udp {
                return None;
            }
            src_addr[0] = unsafe { core::ptr::addr_of!((*ipv4_hdr).src_addr).read_unaligned() };
            dst_addr[0] = unsafe { core::ptr::addr_of!((*ipv4_hdr).dst_addr).read_unaligned() };
            let ihl = unsafe { (*ipv4_hdr).ihl() } as usize * 4;
            let ihl = if ihl < IPV4_HDR_LEN { IPV4_HDR_LEN } else { ihl };
            family = FAMILY_V4;
            l4_offset = ETH_HDR_LEN + ihl;
        }
        EtherType::Ipv6 => {
            let ipv6_hdr: *const Ipv6Hdr = ptr_at(data, data_end, ETH_HDR_LEN)?;
            let next = unsafe { core::ptr::addr_of!((*ipv6_hdr).next_hdr).read_unaligned() };
            if next != IpProto::Udp {
                return None;
            }
            let src = unsafe { core::ptr::addr_of!((*ipv6_hdr).src_addr).read_unaligned() };
            let dst = unsafe { core::ptr::addr_of!((*ipv6_hdr).dst_addr).read_unaligned() };
            src_addr = unsafe { src.in6_u.u6_addr32 };
            dst_addr = unsafe { dst.in6_u.u6_addr32 };
            family = FAMILY_V6;
            l4_offset = ETH_HDR_LEN + IPV6_HDR_LEN;
        }
        _ => return None,
    }

    let udp_hdr: *const UdpHdr = ptr_at(data, data_end, l4_offset)?;
    let src_port =
        unsafe { u16::from_be(core::ptr::addr_of!((*udp_hdr).source).read_unaligned()) };
    if src_port != DNS_PORT {
        return None;
    }

    let payload = data + l4_offset + UDP_HDR_LEN;
    if payload >= data_end {
        return None;
    }
    let available = data_end - payload;
    let payload_len = if available > DNS_MSG_MAX {
        DNS_MSG_MAX
    } else {
        available
    };
    if payload + payload_len > data_end {
        return None;
    }

    Some(ResponseMeta {
        src_addr,
        dst_addr,
        family,
        payload,
        payload_len,
    })
}

/// Copies the DNS payload into the per-CPU scratch arena. Returns the
/// staged length, 0 on a bounds failure.
#[inline(always)]
pub fn stage_payload(meta: &ResponseMeta, data_end: usize, scratch: &mut InspectScratch) -> usize {
    let mut n = meta.payload_len;
    if n > DNS_MSG_MAX {
        n = DNS_MSG_MAX;
    }
    if meta.payload + n > data_end {
        return 0;
    }
    unsafe {
        core::ptr::copy_nonoverlapping(meta.payload as *const u8, scratch.msg.as_mut_ptr(), n);
    }
    n
}

#[inline(always)]
pub fn bump(stats: &PerCpuArray<u64>, index: u32) {
    bump_by(stats, index, 1);
}

#[inline(always)]
pub fn bump_by(stats: &PerCpuArray<u64>, index: u32, n: u64) {
    if let Some(counter) = stats.get_ptr_mut(index) {
        unsafe { *counter += n };
    }
}

/// Reverse-Name Trust Index backed by the kernel LPM trie. Read-only on
/// this side; the daemon owns the contents.
pub struct PfxIndex<'a>(pub &'a LpmTrie<[u8; NAME_BUF], u64>);

impl TrustIndex for PfxIndex<'_> {
    #[inline(always)]
    fn lookup(&self, key: &[u8; NAME_BUF], len: usize) -> Option<u64> {
        self.0.get(&Key::new((len * 8) as u32, *key)).copied()
    }
}

/// Trust-Set Publisher backed by the shared table map. The map's own
/// insert is atomic; concurrent invocations on other CPUs need no
/// external locking.
pub struct MapSink<'a> {
    pub table: &'a HashMap<TrustKey, u64>,
    pub now: u64,
}

impl TrustSink for MapSink<'_> {
    #[inline(always)]
    fn publish(&mut self, set_id: u64, ip: TrustedIp) -> bool {
        let key = match ip {
            TrustedIp::V4(octets) => TrustKey::v4(set_id, octets),
            TrustedIp::V6(octets) => TrustKey::v6(set_id, octets),
        };
        self.table.insert(&key, &self.now, 0).is_ok()
    }
}

/// Entry point shared by the TC and XDP programs: classify, stage, run
/// the message gate, account, and emit a telemetry event on a match.
/// Never influences the verdict on the packet itself.
#[inline(always)]
pub fn inspect_packet(
    data: usize,
    data_end: usize,
    pfx: &LpmTrie<[u8; NAME_BUF], u64>,
    table: &HashMap<TrustKey, u64>,
    scratch_map: &PerCpuArray<InspectScratch>,
    stats: &PerCpuArray<u64>,
    events: &RingBuf,
) {
    let Some(meta) = parse_dns_response(data, data_end) else {
        return;
    };
    bump(stats, STAT_RESPONSES_SEEN);

    let Some(scratch) = scratch_map.get_ptr_mut(0) else {
        return;
    };
    let scratch = unsafe { &mut *scratch };

    let staged = stage_payload(&meta, data_end, scratch);
    if staged < DNS_HDR_LEN {
        bump(stats, STAT_PARSE_FAILED);
        return;
    }

    let now = unsafe { bpf_ktime_get_boot_ns() };
    let index = PfxIndex(pfx);
    let mut sink = MapSink { table, now };

    let msg = &scratch.msg;
    let names = &mut scratch.names;
    let outcome = inspect_response(&msg[..staged], names, &index, &mut sink);

    match outcome {
        Inspection::Ignored => bump(stats, STAT_GATE_REJECTED),
        Inspection::NoMatch => bump(stats, STAT_NO_MATCH),
        Inspection::Matched { set_id, stats: walk } => {
            bump(stats, STAT_MATCHED);
            bump_by(stats, STAT_IPS_PUBLISHED, walk.published as u64);
            bump_by(stats, STAT_TABLE_FULL, walk.publish_failed as u64);
            if walk.truncated {
                bump(stats, STAT_PARSE_FAILED);
            }

            let emitted = emit_event(events, &meta, now, staged, set_id, &walk);
            if !emitted {
                bump(stats, STAT_EVENTS_DROPPED);
            }
        }
    }
}

#[inline(always)]
fn emit_event(
    events: &RingBuf,
    meta: &ResponseMeta,
    now: u64,
    staged: usize,
    set_id: u64,
    walk: &dnstrust_common::dns::WalkStats,
) -> bool {
    let Some(mut entry) = events.reserve::<DnsExchangeEvent>(0) else {
        return false;
    };
    let event = entry.as_mut_ptr();
    unsafe {
        (*event).kind = EVENT_DNS_EXCHANGE;
        (*event).len = core::mem::size_of::<DnsExchangeEvent>() as u16;
        (*event).family = meta.family;
        (*event)._pad0 = [0u8; 3];
        (*event).timestamp_ns = now;
        (*event).src_addr = meta.src_addr;
        (*event).dst_addr = meta.dst_addr;
        (*event).set_id = set_id;
        (*event).msg_len = staged as u16;
        (*event).records = walk.records;
        (*event).published = walk.published;
        (*event).direction = DIRECTION_RESPONSE;
        (*event).outcome = if walk.truncated {
            OUTCOME_TRUNCATED
        } else {
            OUTCOME_COMPLETE
        };
    }
    entry.submit(0);
    true
}
