//! eBPF program loading and map plumbing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use anyhow::{Context, Result};
use aya::{
    maps::{
        lpm_trie::{Key, LpmTrie},
        HashMap, MapData, PerCpuArray, RingBuf,
    },
    programs::{tc, SchedClassifier, TcAttachType, Xdp, XdpFlags as AyaXdpFlags},
    Ebpf,
};
use log::info;
use serde::Serialize;

use crate::config::{Config, EbpfConfig, EbpfMode, TcDirection, XdpFlags};
use crate::trust_index::TrustIndex;
use dnstrust_common::{
    TrustKey, FAMILY_V4, FAMILY_V6, NAME_BUF, STAT_EVENTS_DROPPED, STAT_GATE_REJECTED,
    STAT_IPS_PUBLISHED, STAT_MATCHED, STAT_NO_MATCH, STAT_PARSE_FAILED, STAT_RESPONSES_SEEN,
    STAT_TABLE_FULL,
};

/// One Trust-Set table entry, as shown by the API.
#[derive(Debug, Clone, Serialize)]
pub struct TrustEntry {
    pub ip: IpAddr,
    pub family: &'static str,
    pub set_id: u64,
    pub last_seen_ns: u64,
}

/// Kernel-side inspection counters, summed over CPUs.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct InspectStats {
    pub responses_seen: u64,
    pub gate_rejected: u64,
    pub no_match: u64,
    pub matched: u64,
    pub ips_published: u64,
    pub parse_failed: u64,
    pub table_full: u64,
    pub events_dropped: u64,
}

/// eBPF program manager: owns the loaded object, its attachments, and
/// the set of trie keys this daemon has written.
pub struct EbpfManager {
    ebpf: Ebpf,
    config: EbpfConfig,
    attached_interfaces: Vec<String>,
    synced_keys: Vec<(u32, [u8; NAME_BUF])>,
}

impl EbpfManager {
    pub fn load(config: &Config) -> Result<Self> {
        let ebpf = match config.ebpf.mode {
            EbpfMode::Xdp => {
                let bytes = load_ebpf_program(
                    config.ebpf.xdp_program_path.as_deref(),
                    "XDP",
                    "dnstrust-xdp",
                )?;
                Ebpf::load(&bytes).context("Failed to load XDP eBPF program")?
            }
            EbpfMode::Tc => {
                let bytes = load_ebpf_program(
                    config.ebpf.tc_program_path.as_deref(),
                    "TC",
                    "dnstrust-tc",
                )?;
                Ebpf::load(&bytes).context("Failed to load TC eBPF program")?
            }
        };

        Ok(Self {
            ebpf,
            config: config.ebpf.clone(),
            attached_interfaces: Vec::new(),
            synced_keys: Vec::new(),
        })
    }

    pub fn attach(&mut self, interfaces: &[String]) -> Result<()> {
        self.load_program()?;
        for iface in interfaces {
            self.attach_single(iface)?;
            self.attached_interfaces.push(iface.clone());
        }
        Ok(())
    }

    fn load_program(&mut self) -> Result<()> {
        match self.config.mode {
            EbpfMode::Xdp => {
                let program: &mut Xdp = self
                    .ebpf
                    .program_mut("dnstrust_xdp")
                    .context("XDP program not found")?
                    .try_into()?;
                program.load().context("Failed to load XDP program")?;
            }
            EbpfMode::Tc => {
                let program: &mut SchedClassifier = self
                    .ebpf
                    .program_mut("dnstrust_tc")
                    .context("TC program not found")?
                    .try_into()?;
                program.load().context("Failed to load TC program")?;
            }
        }
        Ok(())
    }

    fn attach_single(&mut self, iface: &str) -> Result<()> {
        match self.config.mode {
            EbpfMode::Xdp => {
                let program: &mut Xdp = self
                    .ebpf
                    .program_mut("dnstrust_xdp")
                    .context("XDP program not found")?
                    .try_into()?;

                let flags = match self.config.xdp_flags {
                    XdpFlags::Default => AyaXdpFlags::default(),
                    XdpFlags::Skb => AyaXdpFlags::SKB_MODE,
                    XdpFlags::Driver => AyaXdpFlags::DRV_MODE,
                    XdpFlags::Hw => AyaXdpFlags::HW_MODE,
                };

                program
                    .attach(iface, flags)
                    .with_context(|| format!("Failed to attach XDP to {}", iface))?;
                info!("XDP ({:?}) attached to {}", self.config.xdp_flags, iface);
            }
            EbpfMode::Tc => {
                let _ = tc::qdisc_add_clsact(iface);

                let program: &mut SchedClassifier = self
                    .ebpf
                    .program_mut("dnstrust_tc")
                    .context("TC program not found")?
                    .try_into()?;

                // Responses arrive inbound, so ingress is the natural
                // hook; egress exists for routed/forwarded topologies.
                match self.config.tc_direction {
                    TcDirection::Ingress => {
                        program
                            .attach(iface, TcAttachType::Ingress)
                            .with_context(|| format!("Failed to attach TC ingress to {}", iface))?;
                        info!("TC ingress attached to {}", iface);
                    }
                    TcDirection::Egress => {
                        program
                            .attach(iface, TcAttachType::Egress)
                            .with_context(|| format!("Failed to attach TC egress to {}", iface))?;
                        info!("TC egress attached to {}", iface);
                    }
                    TcDirection::Both => {
                        program
                            .attach(iface, TcAttachType::Ingress)
                            .with_context(|| format!("Failed to attach TC ingress to {}", iface))?;
                        program
                            .attach(iface, TcAttachType::Egress)
                            .with_context(|| format!("Failed to attach TC egress to {}", iface))?;
                        info!("TC ingress+egress attached to {}", iface);
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes the compiled trust index into the kernel LPM trie and
    /// removes any key from a previous sync that is no longer present.
    /// The dataplane reads concurrently; per-key updates are atomic on
    /// the kernel side so no quiescing is needed.
    pub fn sync_index(&mut self, index: &TrustIndex) -> Result<()> {
        let mut trie: LpmTrie<_, [u8; NAME_BUF], u64> = LpmTrie::try_from(
            self.ebpf
                .map_mut("DNS_PFX")
                .context("DNS_PFX map not found")?,
        )?;

        let mut fresh: Vec<(u32, [u8; NAME_BUF])> = Vec::with_capacity(index.keys().len());
        for compiled in index.keys() {
            let bits = (compiled.len * 8) as u32;
            trie.insert(&Key::new(bits, compiled.key), compiled.set_id, 0)
                .with_context(|| format!("Failed to insert key for {}", compiled.source))?;
            fresh.push((bits, compiled.key));
        }

        let mut removed = 0usize;
        for (bits, key) in &self.synced_keys {
            if !fresh.contains(&(*bits, *key)) {
                let _ = trie.remove(&Key::new(*bits, *key));
                removed += 1;
            }
        }

        info!(
            "Synced {} trie keys ({} domains, {} stale removed)",
            fresh.len(),
            index.domain_count(),
            removed
        );
        self.synced_keys = fresh;
        Ok(())
    }

    /// Dumps the shared Trust-Set table. Read-only; expiry is the table
    /// owner's business, not ours.
    pub fn trust_entries(&self) -> Result<Vec<TrustEntry>> {
        let table: HashMap<_, TrustKey, u64> = HashMap::try_from(
            self.ebpf
                .map("TRUST_SETS")
                .context("TRUST_SETS map not found")?,
        )?;

        let mut entries = Vec::new();
        for item in table.iter() {
            let (key, last_seen_ns) = item?;
            let (ip, family) = match key.family {
                FAMILY_V4 => {
                    let mut o = [0u8; 4];
                    o.copy_from_slice(&key.addr[..4]);
                    (IpAddr::V4(Ipv4Addr::from(o)), "ipv4")
                }
                FAMILY_V6 => (IpAddr::V6(Ipv6Addr::from(key.addr)), "ipv6"),
                _ => continue,
            };
            entries.push(TrustEntry {
                ip,
                family,
                set_id: key.set_id,
                last_seen_ns,
            });
        }
        Ok(entries)
    }

    pub fn trust_entry_count(&self) -> usize {
        self.trust_entries().map(|e| e.len()).unwrap_or(0)
    }

    /// Sums the per-CPU inspection counters.
    pub fn stats(&self) -> Result<InspectStats> {
        let counters: PerCpuArray<_, u64> = PerCpuArray::try_from(
            self.ebpf
                .map("DNS_STATS")
                .context("DNS_STATS map not found")?,
        )?;

        let sum = |idx: u32| -> u64 {
            counters
                .get(&idx, 0)
                .map(|values| values.iter().sum())
                .unwrap_or(0)
        };

        Ok(InspectStats {
            responses_seen: sum(STAT_RESPONSES_SEEN),
            gate_rejected: sum(STAT_GATE_REJECTED),
            no_match: sum(STAT_NO_MATCH),
            matched: sum(STAT_MATCHED),
            ips_published: sum(STAT_IPS_PUBLISHED),
            parse_failed: sum(STAT_PARSE_FAILED),
            table_full: sum(STAT_TABLE_FULL),
            events_dropped: sum(STAT_EVENTS_DROPPED),
        })
    }

    pub fn take_ring_buf(&mut self) -> Result<RingBuf<MapData>> {
        RingBuf::try_from(
            self.ebpf
                .take_map("DNS_EVENTS")
                .context("DNS_EVENTS map not found")?,
        )
        .context("Failed to create RingBuf")
    }

    pub fn hook_type(&self) -> &str {
        match self.config.mode {
            EbpfMode::Xdp => "xdp",
            EbpfMode::Tc => "tc",
        }
    }

    pub fn interfaces(&self) -> &[String] {
        &self.attached_interfaces
    }
}

/// aya detaches link-attached programs when the Ebpf object drops; only
/// log here.
impl Drop for EbpfManager {
    fn drop(&mut self) {
        if !self.attached_interfaces.is_empty() {
            info!(
                "Cleaning up eBPF programs from: {:?}",
                self.attached_interfaces
            );
        }
    }
}

fn load_ebpf_program(configured_path: Option<&str>, name: &str, filename: &str) -> Result<Vec<u8>> {
    if let Some(path_str) = configured_path {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading {} eBPF program from configured path: {}", name, path_str);
            return std::fs::read(path)
                .with_context(|| format!("Failed to read {} eBPF program from {}", name, path_str));
        }
        anyhow::bail!(
            "{} eBPF program not found at configured path: {}",
            name,
            path_str
        );
    }

    let search_paths = get_default_ebpf_paths(filename);
    for path_str in &search_paths {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Found {} eBPF program at: {}", name, path_str);
            return std::fs::read(path)
                .with_context(|| format!("Failed to read {} eBPF program from {}", name, path_str));
        }
    }

    anyhow::bail!(
        "{} eBPF program not found. Searched paths:\n  {}",
        name,
        search_paths.join("\n  ")
    )
}

fn get_default_ebpf_paths(filename: &str) -> Vec<String> {
    let target_dir = "target/bpfel-unknown-none/release";

    let base_paths = vec![".", "..", "/usr/share/dnstrust", "/opt/dnstrust"];

    let mut paths = Vec::new();
    for base in base_paths {
        paths.push(format!("{}/{}/{}", base, target_dir, filename));
    }
    paths.push(filename.to_string());
    paths
}
