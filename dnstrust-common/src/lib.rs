#![cfg_attr(not(any(test, feature = "user")), no_std)]

pub mod dns;

/// Staged DNS payload maximum. 512 bytes covers classic UDP DNS; larger
/// EDNS0 responses are inspected up to this prefix.
pub const DNS_MSG_MAX: usize = 512;

/// Fixed name buffer size: 255-byte DNS name limit plus a terminator.
pub const NAME_BUF: usize = 256;

/// Hard cap on resource-record iteration steps per message, independent
/// of the counts claimed in the header.
pub const RECORD_CAP: usize = 1000;

pub const FAMILY_V4: u8 = 4;
pub const FAMILY_V6: u8 = 6;

/// Key of the shared trust-set table: one entry per
/// (policy-set id, address-family-qualified IP). The value is the kernel
/// boot-time timestamp (ns) of the last observation; presence is what the
/// policy engine consults, the timestamp lets the table owner expire
/// entries.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrustKey {
    pub set_id: u64,
    /// IPv4 occupies the first 4 bytes, the rest zero.
    pub addr: [u8; 16],
    pub family: u8,
    pub _pad: [u8; 7],
}

impl TrustKey {
    pub fn v4(set_id: u64, octets: [u8; 4]) -> Self {
        let mut addr = [0u8; 16];
        addr[..4].copy_from_slice(&octets);
        TrustKey {
            set_id,
            addr,
            family: FAMILY_V4,
            _pad: [0u8; 7],
        }
    }

    pub fn v6(set_id: u64, octets: [u8; 16]) -> Self {
        TrustKey {
            set_id,
            addr: octets,
            family: FAMILY_V6,
            _pad: [0u8; 7],
        }
    }
}

/// Event type tag of [`DnsExchangeEvent`].
pub const EVENT_DNS_EXCHANGE: u16 = 1;

pub const DIRECTION_RESPONSE: u8 = 1;

/// Walk finished within bounds.
pub const OUTCOME_COMPLETE: u8 = 1;
/// Walk stopped at a truncated or malformed record; earlier publications
/// were kept.
pub const OUTCOME_TRUNCATED: u8 = 2;

/// Telemetry record emitted for each matched DNS response: a fixed-size
/// header (type tag, length), then a timestamp and the exchange metadata.
/// Observability only; never consulted for policy.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DnsExchangeEvent {
    pub kind: u16,
    pub len: u16,
    /// FAMILY_V4 or FAMILY_V6 of both addresses.
    pub family: u8,
    pub _pad0: [u8; 3],
    pub timestamp_ns: u64,
    /// IPv4 in the first word, network byte order.
    pub src_addr: [u32; 4],
    pub dst_addr: [u32; 4],
    pub set_id: u64,
    pub msg_len: u16,
    pub records: u16,
    pub published: u16,
    pub direction: u8,
    pub outcome: u8,
}

// Per-CPU stat counter indices.
pub const STAT_RESPONSES_SEEN: u32 = 0;
pub const STAT_GATE_REJECTED: u32 = 1;
pub const STAT_NO_MATCH: u32 = 2;
pub const STAT_MATCHED: u32 = 3;
pub const STAT_IPS_PUBLISHED: u32 = 4;
pub const STAT_PARSE_FAILED: u32 = 5;
pub const STAT_TABLE_FULL: u32 = 6;
pub const STAT_EVENTS_DROPPED: u32 = 7;
pub const STAT_MAX: u32 = 8;

/// Per-invocation name staging: canonical question name, its reversed
/// trie key, and the current record's owner name.
#[repr(C)]
pub struct NameScratch {
    pub qname: [u8; NAME_BUF],
    pub rev: [u8; NAME_BUF],
    pub owner: [u8; NAME_BUF],
}

/// The per-CPU scratch arena: staged packet bytes plus derived strings.
/// One instance per execution unit; sized so nothing here ever lands on
/// the (tiny) stack.
#[repr(C)]
pub struct InspectScratch {
    pub msg: [u8; DNS_MSG_MAX],
    pub names: NameScratch,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for TrustKey {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for DnsExchangeEvent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_key_layout_is_stable() {
        // Shared with the BPF side; padding must be explicit.
        assert_eq!(core::mem::size_of::<TrustKey>(), 32);
        assert_eq!(core::mem::align_of::<TrustKey>(), 8);
    }

    #[test]
    fn event_layout_is_stable() {
        assert_eq!(core::mem::size_of::<DnsExchangeEvent>(), 64);
        assert_eq!(core::mem::align_of::<DnsExchangeEvent>(), 8);
    }

    #[test]
    fn v4_key_zero_fills_address_tail() {
        let k = TrustKey::v4(7, [93, 184, 216, 34]);
        assert_eq!(&k.addr[..4], &[93, 184, 216, 34]);
        assert!(k.addr[4..].iter().all(|&b| b == 0));
        assert_eq!(k.family, FAMILY_V4);
    }
}
