//! Daemon configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Interfaces to attach to (one program instance each).
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub ebpf: EbpfConfig,
    /// Policy domains feeding the Reverse-Name Trust Index.
    #[serde(default)]
    pub policy: Vec<PolicyDomain>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub http_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EbpfConfig {
    #[serde(default)]
    pub mode: EbpfMode,
    /// XDP flags: "default", "skb", "driver", "hw".
    #[serde(default)]
    pub xdp_flags: XdpFlags,
    /// ingress, egress, or both (TC mode).
    #[serde(default)]
    pub tc_direction: TcDirection,
    /// Explicit program object paths; searched for if unset.
    pub xdp_program_path: Option<String>,
    pub tc_program_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EbpfMode {
    Xdp,
    #[default]
    Tc,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum XdpFlags {
    #[default]
    Default,
    Skb,    // Generic XDP (fallback)
    Driver, // Native XDP
    Hw,     // Hardware offload
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TcDirection {
    #[default]
    Ingress,
    Egress,
    Both,
}

/// One registered policy domain. A plain domain covers itself and all
/// subdomains; a `*.` prefix covers subdomains only.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicyDomain {
    pub domain: String,
    /// Opaque policy-set identifier the policy engine groups IPs under.
    pub set_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            anyhow::bail!("At least one interface must be specified");
        }
        for entry in &self.policy {
            validate_domain(&entry.domain)
                .with_context(|| format!("Invalid policy domain: {}", entry.domain))?;
        }
        Ok(())
    }
}

/// Accepts `example.com` or `*.example.com`; labels of letters, digits,
/// `-` and `_`, whole name within the 253-byte presentation limit.
pub fn validate_domain(domain: &str) -> Result<()> {
    let name = domain.strip_prefix("*.").unwrap_or(domain);
    if name.is_empty() || name.len() > 253 {
        anyhow::bail!("domain must be 1..=253 characters");
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            anyhow::bail!("labels must be 1..=63 characters");
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            anyhow::bail!("labels may only contain letters, digits, '-' and '_'");
        }
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                http_addr: "0.0.0.0:8080".to_string(),
            },
            interfaces: vec!["eth0".to_string()],
            ebpf: EbpfConfig::default(),
            policy: vec![],
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            interfaces = ["eth0", "eth1"]

            [server]
            http_addr = "127.0.0.1:8080"

            [ebpf]
            mode = "tc"
            tc_direction = "ingress"

            [[policy]]
            domain = "example.com"
            set_id = 7

            [[policy]]
            domain = "*.trusted.internal"
            set_id = 12

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.interfaces.len(), 2);
        assert_eq!(cfg.ebpf.mode, EbpfMode::Tc);
        assert_eq!(cfg.policy[0].set_id, 7);
        assert_eq!(cfg.policy[1].domain, "*.trusted.internal");
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn rejects_empty_interfaces() {
        let cfg = Config {
            interfaces: vec![],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn domain_validation() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("*.example.com").is_ok());
        assert!(validate_domain("xn--bcher-kva.example").is_ok());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("bad..dots").is_err());
        assert!(validate_domain("white space.com").is_err());
        assert!(validate_domain(&"a".repeat(254)).is_err());
    }
}
