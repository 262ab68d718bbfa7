//! DNS response inspection core.
//!
//! Everything here is pure code over `&[u8]`: no heap, fixed-size output
//! buffers, and hard iteration bounds, so the same functions run inside
//! the BPF programs and under ordinary unit tests. The kernel side plugs
//! its maps in through the [`TrustIndex`] and [`TrustSink`] seams.

use crate::{NameScratch, NAME_BUF, RECORD_CAP};

pub const DNS_HDR_LEN: usize = 12;

pub const TYPE_A: u16 = 1;
pub const TYPE_AAAA: u16 = 28;
pub const CLASS_IN: u16 = 1;
pub const CLASS_ANY: u16 = 255;

/// Upper bound on labels per name; a 255-byte name cannot hold more.
const MAX_LABELS: usize = 128;

const PTR_MASK: u8 = 0xC0;

#[inline(always)]
fn read_u16(msg: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*msg.get(off)?, *msg.get(off + 1)?]))
}

/// Parsed DNS message header.
#[derive(Clone, Copy, Debug)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn parse(msg: &[u8]) -> Option<DnsHeader> {
        if msg.len() < DNS_HDR_LEN {
            return None;
        }
        Some(DnsHeader {
            id: read_u16(msg, 0)?,
            flags: read_u16(msg, 2)?,
            qdcount: read_u16(msg, 4)?,
            ancount: read_u16(msg, 6)?,
            nscount: read_u16(msg, 8)?,
            arcount: read_u16(msg, 10)?,
        })
    }

    /// QR bit: set on responses.
    pub fn is_response(&self) -> bool {
        self.flags & 0x8000 != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0xF) as u8
    }

    pub fn truncated(&self) -> bool {
        self.flags & 0x0200 != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }

    /// Total records across answer, authority and additional sections.
    pub fn record_total(&self) -> usize {
        self.ancount as usize + self.nscount as usize + self.arcount as usize
    }
}

/// Decodes the DNS-encoded name at `off` into `out` as the canonical
/// form: ASCII-lowercase labels joined with `.`, NUL-terminated.
///
/// Returns `(consumed, len)` where `consumed` counts only the bytes of
/// the original occurrence (a compression pointer counts as 2, never the
/// target's length) and `len` is the canonical length excluding the NUL.
/// Exactly one pointer redirection is permitted; a second pointer, a
/// reserved length tag, a name that would overflow `out`, or any read
/// past the end of `msg` fails the decode.
pub fn decode_name(msg: &[u8], off: usize, out: &mut [u8; NAME_BUF]) -> Option<(usize, usize)> {
    let mut pos = off;
    let mut consumed = 0usize;
    let mut jumped = false;
    let mut len = 0usize;

    for _ in 0..MAX_LABELS {
        let tag = *msg.get(pos)?;
        if tag == 0 {
            if !jumped {
                consumed = pos + 1 - off;
            }
            out[len] = 0;
            return Some((consumed, len));
        }
        if tag & PTR_MASK == PTR_MASK {
            // One redirection only; loops in the wire format terminate here.
            if jumped {
                return None;
            }
            let lo = *msg.get(pos + 1)?;
            consumed = pos + 2 - off;
            jumped = true;
            pos = ((tag & 0x3F) as usize) << 8 | lo as usize;
            continue;
        }
        if tag & PTR_MASK != 0 {
            // 0x40/0x80 length tags are reserved.
            return None;
        }
        let llen = tag as usize;
        let label = msg.get(pos + 1..pos + 1 + llen)?;
        let sep = usize::from(len > 0);
        // Separator, label and NUL must all fit in the fixed buffer.
        if len + sep + llen + 1 > NAME_BUF {
            return None;
        }
        if sep == 1 {
            out[len] = b'.';
            len += 1;
        }
        for &b in label {
            out[len] = b.to_ascii_lowercase();
            len += 1;
        }
        pos += 1 + llen;
    }
    // No terminator within the label budget.
    None
}

/// Builds the lookup key for a question name: the canonical bytes
/// reversed, closed with a NUL. Returns the key length.
pub fn query_key(name: &[u8; NAME_BUF], len: usize, out: &mut [u8; NAME_BUF]) -> usize {
    let mut i = 0;
    while i < len && i < NAME_BUF - 1 {
        out[i] = name[len - 1 - i];
        i += 1;
    }
    out[i] = 0;
    i + 1
}

fn registered_key(domain: &str, terminator: u8, out: &mut [u8; NAME_BUF]) -> Option<usize> {
    let bytes = domain.as_bytes();
    if bytes.is_empty() || bytes.len() + 1 > NAME_BUF {
        return None;
    }
    for (i, &b) in bytes.iter().rev().enumerate() {
        out[i] = b.to_ascii_lowercase();
    }
    out[bytes.len()] = terminator;
    Some(bytes.len() + 1)
}

/// Trie key registered for the domain itself: reversed bytes plus NUL.
/// Prefix-matches only the exact query key.
pub fn exact_key(domain: &str, out: &mut [u8; NAME_BUF]) -> Option<usize> {
    registered_key(domain, 0, out)
}

/// Trie key registered for a domain's subtree: reversed bytes plus `.`.
/// Prefix-matches strict subdomains and nothing else -- in particular a
/// registration for `example.com` can never match `notexample.com`,
/// because the byte after the reversed parent is the label separator.
pub fn subtree_key(domain: &str, out: &mut [u8; NAME_BUF]) -> Option<usize> {
    registered_key(domain, b'.', out)
}

/// Longest-prefix lookup over reversed-name keys. Read-only here; the
/// index is populated out-of-band by policy configuration.
pub trait TrustIndex {
    fn lookup(&self, key: &[u8; NAME_BUF], len: usize) -> Option<u64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustedIp {
    V4([u8; 4]),
    V6([u8; 16]),
}

/// Destination for extracted answer IPs. `publish` is an idempotent
/// insert-if-absent; `false` means the table rejected the entry (full),
/// which is recorded but never stops the walk.
pub trait TrustSink {
    fn publish(&mut self, set_id: u64, ip: TrustedIp) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Records fully processed.
    pub records: u16,
    /// IPs accepted by the sink.
    pub published: u16,
    /// IPs the sink rejected.
    pub publish_failed: u16,
    /// The walk stopped at a truncated or malformed record.
    pub truncated: bool,
}

/// Walks the answer/authority/additional sections starting at `off`.
///
/// At most [`RECORD_CAP`] records are processed no matter what the header
/// claims. A/AAAA records of class IN or ANY with the exact rdlength for
/// their family are published under `set_id`; every other record is
/// skipped by advancing over its declared rdlength. A read past the end
/// of the message stops the walk; entries already published stay.
pub fn walk_records(
    msg: &[u8],
    mut off: usize,
    total: usize,
    set_id: u64,
    owner: &mut [u8; NAME_BUF],
    sink: &mut impl TrustSink,
) -> WalkStats {
    let mut stats = WalkStats::default();
    let count = if total > RECORD_CAP { RECORD_CAP } else { total };

    for i in 0..RECORD_CAP {
        if i >= count {
            break;
        }
        let Some((consumed, _)) = decode_name(msg, off, owner) else {
            stats.truncated = true;
            break;
        };
        off += consumed;

        // Fixed metadata block: type(2) class(2) ttl(4) rdlength(2).
        let (Some(rtype), Some(class), Some(rdlen)) = (
            read_u16(msg, off),
            read_u16(msg, off + 2),
            read_u16(msg, off + 8),
        ) else {
            stats.truncated = true;
            break;
        };
        let rdata = off + 10;
        let Some(end) = rdata.checked_add(rdlen as usize) else {
            stats.truncated = true;
            break;
        };
        if end > msg.len() {
            stats.truncated = true;
            break;
        }

        if class == CLASS_IN || class == CLASS_ANY {
            let ip = match (rtype, rdlen) {
                (TYPE_A, 4) => {
                    let mut o = [0u8; 4];
                    o.copy_from_slice(&msg[rdata..rdata + 4]);
                    Some(TrustedIp::V4(o))
                }
                (TYPE_AAAA, 16) => {
                    let mut o = [0u8; 16];
                    o.copy_from_slice(&msg[rdata..rdata + 16]);
                    Some(TrustedIp::V6(o))
                }
                // A/AAAA with a wrong rdlength is malformed: not
                // published, but skippable like any unknown type.
                _ => None,
            };
            if let Some(ip) = ip {
                if sink.publish(set_id, ip) {
                    stats.published += 1;
                } else {
                    stats.publish_failed += 1;
                }
            }
        }

        off = end;
        stats.records += 1;
    }
    stats
}

/// Outcome of inspecting one DNS payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inspection {
    /// Not a clean single-question response (or undecodable question);
    /// nothing was read past the point of rejection, no state touched.
    Ignored,
    /// Well-formed response for a name no registered domain covers.
    NoMatch,
    /// Question matched a registered domain; answers were walked.
    Matched { set_id: u64, stats: WalkStats },
}

/// The message gate: validates the header, decodes and matches the
/// question name, and only on an index hit pays for answer parsing.
pub fn inspect_response(
    msg: &[u8],
    names: &mut NameScratch,
    index: &impl TrustIndex,
    sink: &mut impl TrustSink,
) -> Inspection {
    let Some(hdr) = DnsHeader::parse(msg) else {
        return Inspection::Ignored;
    };
    if !hdr.is_response() || hdr.rcode() != 0 || hdr.qdcount != 1 {
        return Inspection::Ignored;
    }

    let Some((consumed, qlen)) = decode_name(msg, DNS_HDR_LEN, &mut names.qname) else {
        return Inspection::Ignored;
    };
    // Question fixed part: qtype(2) qclass(2).
    let answers = DNS_HDR_LEN + consumed + 4;
    if answers > msg.len() {
        return Inspection::Ignored;
    }

    let klen = query_key(&names.qname, qlen, &mut names.rev);
    let Some(set_id) = index.lookup(&names.rev, klen) else {
        return Inspection::NoMatch;
    };

    let stats = walk_records(
        msg,
        answers,
        hdr.record_total(),
        set_id,
        &mut names.owner,
        sink,
    );
    Inspection::Matched { set_id, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> NameScratch {
        NameScratch {
            qname: [0; NAME_BUF],
            rev: [0; NAME_BUF],
            owner: [0; NAME_BUF],
        }
    }

    fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.').filter(|l| !l.is_empty()) {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    fn header(flags: u16, qd: u16, an: u16, ns: u16, ar: u16) -> Vec<u8> {
        let mut msg = vec![0x12, 0x34];
        for v in [flags, qd, an, ns, ar] {
            msg.extend_from_slice(&v.to_be_bytes());
        }
        msg
    }

    fn push_question(msg: &mut Vec<u8>, name: &str, qtype: u16) {
        msg.extend_from_slice(&encode_name(name));
        msg.extend_from_slice(&qtype.to_be_bytes());
        msg.extend_from_slice(&CLASS_IN.to_be_bytes());
    }

    fn push_rr(msg: &mut Vec<u8>, name_bytes: &[u8], rtype: u16, class: u16, rdata: &[u8]) {
        msg.extend_from_slice(name_bytes);
        msg.extend_from_slice(&rtype.to_be_bytes());
        msg.extend_from_slice(&class.to_be_bytes());
        msg.extend_from_slice(&300u32.to_be_bytes());
        msg.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        msg.extend_from_slice(rdata);
    }

    /// Reference longest-prefix matcher over registered reversed keys.
    #[derive(Default)]
    struct TestIndex {
        prefixes: Vec<(Vec<u8>, u64)>,
    }

    impl TestIndex {
        /// Registers the domain and its subtree, like the daemon does for
        /// a plain policy entry.
        fn register(&mut self, domain: &str, set_id: u64) {
            let mut buf = [0u8; NAME_BUF];
            let n = exact_key(domain, &mut buf).unwrap();
            self.prefixes.push((buf[..n].to_vec(), set_id));
            let n = subtree_key(domain, &mut buf).unwrap();
            self.prefixes.push((buf[..n].to_vec(), set_id));
        }

        fn register_subtree(&mut self, domain: &str, set_id: u64) {
            let mut buf = [0u8; NAME_BUF];
            let n = subtree_key(domain, &mut buf).unwrap();
            self.prefixes.push((buf[..n].to_vec(), set_id));
        }
    }

    impl TrustIndex for TestIndex {
        fn lookup(&self, key: &[u8; NAME_BUF], len: usize) -> Option<u64> {
            self.prefixes
                .iter()
                .filter(|(p, _)| p.len() <= len && *p == &key[..p.len()])
                .max_by_key(|(p, _)| p.len())
                .map(|&(_, id)| id)
        }
    }

    /// Records publications; optionally starts rejecting after a budget,
    /// modelling a full table.
    struct VecSink {
        entries: Vec<(u64, TrustedIp)>,
        capacity: Option<usize>,
    }

    impl VecSink {
        fn new() -> Self {
            VecSink {
                entries: Vec::new(),
                capacity: None,
            }
        }
    }

    impl TrustSink for VecSink {
        fn publish(&mut self, set_id: u64, ip: TrustedIp) -> bool {
            if let Some(cap) = self.capacity {
                if self.entries.len() >= cap {
                    return false;
                }
            }
            self.entries.push((set_id, ip));
            true
        }
    }

    fn decode_at(msg: &[u8], off: usize) -> Option<(usize, usize, Vec<u8>)> {
        let mut buf = [0u8; NAME_BUF];
        let (consumed, len) = decode_name(msg, off, &mut buf)?;
        Some((consumed, len, buf[..len].to_vec()))
    }

    #[test]
    fn decodes_and_lowercases_a_simple_name() {
        let enc = encode_name("API.Example.COM");
        let (consumed, len, name) = decode_at(&enc, 0).unwrap();
        assert_eq!(consumed, enc.len());
        assert_eq!(len, "api.example.com".len());
        assert_eq!(name, b"api.example.com");
    }

    #[test]
    fn decoding_is_idempotent() {
        let enc = encode_name("api.example.com");
        let a = decode_at(&enc, 0).unwrap();
        let b = decode_at(&enc, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn root_name_decodes_empty() {
        let (consumed, len, name) = decode_at(&[0u8], 0).unwrap();
        assert_eq!((consumed, len), (1, 0));
        assert!(name.is_empty());
    }

    #[test]
    fn pointer_decodes_like_the_expanded_form() {
        // "example.com" at offset 0, then "api" + pointer back to it.
        let mut msg = encode_name("example.com");
        let site = msg.len();
        msg.extend_from_slice(&[3, b'a', b'p', b'i', 0xC0, 0x00]);

        let expanded = decode_at(&encode_name("api.example.com"), 0).unwrap();
        let (consumed, len, name) = decode_at(&msg, site).unwrap();
        // Pointer bytes count as 2 at the original site.
        assert_eq!(consumed, 4 + 2);
        assert_eq!((len, name), (expanded.1, expanded.2));
    }

    #[test]
    fn second_pointer_hop_is_rejected() {
        // offset 0: pointer to 2; offset 2: pointer to 0.
        let msg = [0xC0, 0x02, 0xC0, 0x00];
        assert!(decode_at(&msg, 0).is_none());
        // A pointer straight to itself terminates the same way.
        let msg = [0xC0, 0x00];
        assert!(decode_at(&msg, 0).is_none());
    }

    #[test]
    fn reserved_length_tags_are_rejected() {
        assert!(decode_at(&[0x41, b'x', 0], 0).is_none());
    }

    #[test]
    fn truncated_label_is_rejected() {
        let msg = [5, b'a', b'b'];
        assert!(decode_at(&msg, 0).is_none());
        // Missing terminator.
        let msg = [1, b'a'];
        assert!(decode_at(&msg, 0).is_none());
    }

    #[test]
    fn overlong_name_is_rejected() {
        // 8 labels of 63 bytes = 511 canonical bytes, past the buffer.
        let mut msg = Vec::new();
        for _ in 0..8 {
            msg.push(63);
            msg.extend_from_slice(&[b'a'; 63]);
        }
        msg.push(0);
        assert!(decode_at(&msg, 0).is_none());
    }

    #[test]
    fn query_key_reverses_and_terminates() {
        let mut name = [0u8; NAME_BUF];
        name[..3].copy_from_slice(b"abc");
        let mut key = [0u8; NAME_BUF];
        let n = query_key(&name, 3, &mut key);
        assert_eq!(n, 4);
        assert_eq!(&key[..4], b"cba\0");
    }

    #[test]
    fn registered_keys_use_distinct_terminators() {
        let mut buf = [0u8; NAME_BUF];
        let n = exact_key("Ab.Cd", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"dc.ba\0");
        let n = subtree_key("ab.cd", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"dc.ba.");
    }

    fn respond(
        index: &TestIndex,
        sink: &mut VecSink,
        flags: u16,
        qd: u16,
        qname: &str,
        records: &[(&[u8], u16, u16, &[u8])],
    ) -> Inspection {
        let mut msg = header(flags, qd, records.len() as u16, 0, 0);
        push_question(&mut msg, qname, TYPE_A);
        for &(name, rtype, class, rdata) in records {
            push_rr(&mut msg, name, rtype, class, rdata);
        }
        inspect_response(&msg, &mut scratch(), index, sink)
    }

    #[test]
    fn matched_response_publishes_answer_ips() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();

        let owner = encode_name("api.example.com");
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "api.example.com",
            &[(&owner, TYPE_A, CLASS_IN, &[93, 184, 216, 34])],
        );

        let Inspection::Matched { set_id, stats } = got else {
            panic!("expected a match, got {got:?}");
        };
        assert_eq!(set_id, 7);
        assert_eq!((stats.records, stats.published), (1, 1));
        assert!(!stats.truncated);
        assert_eq!(sink.entries, vec![(7, TrustedIp::V4([93, 184, 216, 34]))]);
    }

    #[test]
    fn queries_and_error_responses_touch_nothing() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let owner = encode_name("example.com");
        let rr: &[(&[u8], u16, u16, &[u8])] = &[(&owner, TYPE_A, CLASS_IN, &[1, 2, 3, 4])];

        for (flags, qd) in [
            (0x0100, 1), // query
            (0x8183, 1), // NXDOMAIN
            (0x8180, 2), // two questions
            (0x8180, 0), // no question
        ] {
            let mut sink = VecSink::new();
            let got = respond(&index, &mut sink, flags, qd, "example.com", rr);
            assert_eq!(got, Inspection::Ignored, "flags={flags:#06x} qd={qd}");
            assert!(sink.entries.is_empty());
        }
    }

    #[test]
    fn subdomain_matches_but_lookalike_does_not() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let owner = encode_name("x");

        let mut sink = VecSink::new();
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "sub.example.com",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 1])],
        );
        assert!(matches!(got, Inspection::Matched { set_id: 7, .. }));
        assert_eq!(sink.entries.len(), 1);

        let mut sink = VecSink::new();
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "notexample.com",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 2])],
        );
        assert_eq!(got, Inspection::NoMatch);
        assert!(sink.entries.is_empty());
    }

    #[test]
    fn question_name_matching_is_case_insensitive() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();
        let owner = encode_name("x");
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "API.EXAMPLE.COM",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 3])],
        );
        assert!(matches!(got, Inspection::Matched { set_id: 7, .. }));
    }

    #[test]
    fn longest_registered_domain_wins() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        index.register("sub.example.com", 9);
        let mut sink = VecSink::new();
        let owner = encode_name("x");
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "a.sub.example.com",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 4])],
        );
        assert!(matches!(got, Inspection::Matched { set_id: 9, .. }));
    }

    #[test]
    fn wildcard_entry_excludes_the_apex() {
        let mut index = TestIndex::default();
        index.register_subtree("example.com", 7);
        let owner = encode_name("x");

        let mut sink = VecSink::new();
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "example.com",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 5])],
        );
        assert_eq!(got, Inspection::NoMatch);

        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "www.example.com",
            &[(&owner, TYPE_A, CLASS_IN, &[10, 0, 0, 6])],
        );
        assert!(matches!(got, Inspection::Matched { set_id: 7, .. }));
    }

    #[test]
    fn aaaa_and_unknown_types_are_handled() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();

        let v6 = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let owner = encode_name("example.com");
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "example.com",
            &[
                (&owner, 5, CLASS_IN, b"\x03www\x07example\x03com\x00"), // CNAME
                (&owner, TYPE_AAAA, CLASS_IN, &v6),
                (&owner, TYPE_AAAA, CLASS_IN, &[1, 2, 3, 4]), // bogus rdlength
                (&owner, TYPE_A, 3, &[9, 9, 9, 9]),           // class CH
                (&owner, TYPE_A, CLASS_IN, &[8, 8, 8, 8]),
            ],
        );

        let Inspection::Matched { stats, .. } = got else {
            panic!("expected a match");
        };
        // Malformed/foreign records are skipped, not fatal.
        assert_eq!(stats.records, 5);
        assert_eq!(stats.published, 2);
        assert_eq!(
            sink.entries,
            vec![
                (7, TrustedIp::V6(v6)),
                (7, TrustedIp::V4([8, 8, 8, 8])),
            ]
        );
    }

    #[test]
    fn truncated_record_keeps_earlier_publications() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();

        let mut msg = header(0x8180, 1, 2, 0, 0);
        push_question(&mut msg, "example.com", TYPE_A);
        let owner = encode_name("example.com");
        push_rr(&mut msg, &owner, TYPE_A, CLASS_IN, &[1, 1, 1, 1]);
        // Second record claims 4 bytes of rdata but carries 2.
        msg.extend_from_slice(&owner);
        msg.extend_from_slice(&TYPE_A.to_be_bytes());
        msg.extend_from_slice(&CLASS_IN.to_be_bytes());
        msg.extend_from_slice(&300u32.to_be_bytes());
        msg.extend_from_slice(&4u16.to_be_bytes());
        msg.extend_from_slice(&[2, 2]);

        let got = inspect_response(&msg, &mut scratch(), &index, &mut sink);
        let Inspection::Matched { stats, .. } = got else {
            panic!("expected a match");
        };
        assert!(stats.truncated);
        assert_eq!((stats.records, stats.published), (1, 1));
        assert_eq!(sink.entries, vec![(7, TrustedIp::V4([1, 1, 1, 1]))]);
    }

    #[test]
    fn iteration_stops_at_the_record_cap() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();

        // Header claims 65535 answers; the message carries 1200, each
        // owner a pointer back to the question name.
        let mut msg = header(0x8180, 1, 0xFFFF, 0, 0);
        push_question(&mut msg, "example.com", TYPE_A);
        for i in 0..1200u32 {
            push_rr(&mut msg, &[0xC0, 0x0C], TYPE_A, CLASS_IN, &i.to_be_bytes());
        }

        let got = inspect_response(&msg, &mut scratch(), &index, &mut sink);
        let Inspection::Matched { stats, .. } = got else {
            panic!("expected a match");
        };
        assert_eq!(stats.records as usize, RECORD_CAP);
        assert_eq!(stats.published as usize, RECORD_CAP);
        assert_eq!(sink.entries.len(), RECORD_CAP);
    }

    #[test]
    fn full_table_is_counted_but_not_fatal() {
        let mut index = TestIndex::default();
        index.register("example.com", 7);
        let mut sink = VecSink::new();
        sink.capacity = Some(2);

        let owner = encode_name("example.com");
        let got = respond(
            &index,
            &mut sink,
            0x8180,
            1,
            "example.com",
            &[
                (&owner, TYPE_A, CLASS_IN, &[1, 0, 0, 1]),
                (&owner, TYPE_A, CLASS_IN, &[1, 0, 0, 2]),
                (&owner, TYPE_A, CLASS_IN, &[1, 0, 0, 3]),
                (&owner, TYPE_A, CLASS_IN, &[1, 0, 0, 4]),
            ],
        );
        let Inspection::Matched { stats, .. } = got else {
            panic!("expected a match");
        };
        assert_eq!((stats.records, stats.published, stats.publish_failed), (4, 2, 2));
        assert_eq!(sink.entries.len(), 2);
    }

    #[test]
    fn header_flag_accessors() {
        let msg = header(0x8203, 1, 0, 0, 0);
        let hdr = DnsHeader::parse(&msg).unwrap();
        assert!(hdr.is_response());
        assert_eq!(hdr.opcode(), 0);
        assert!(hdr.truncated());
        assert_eq!(hdr.rcode(), 3);
        assert_eq!(hdr.id, 0x1234);
        assert!(DnsHeader::parse(&msg[..11]).is_none());
    }
}
