//! Userland view of the Reverse-Name Trust Index.
//!
//! Policy domains are compiled into the reversed trie keys the kernel
//! LPM map is populated with. A plain domain registers two keys (the
//! exact name and its subtree), a `*.domain` entry the subtree key only,
//! so that the most specific registered domain always wins the
//! longest-prefix match. The same compiled entries back the reference
//! matcher used by the HTTP API.

use anyhow::{Context, Result};
use dnstrust_common::dns::{exact_key, query_key, subtree_key};
use dnstrust_common::NAME_BUF;

use crate::config::{validate_domain, PolicyDomain};

#[derive(Clone)]
pub struct CompiledKey {
    pub key: [u8; NAME_BUF],
    pub len: usize,
    pub set_id: u64,
    /// The policy spelling this key came from, for status output.
    pub source: String,
}

/// Compiled policy domains; rebuildable from config at any time.
#[derive(Clone, Default)]
pub struct TrustIndex {
    keys: Vec<CompiledKey>,
    domains: Vec<PolicyDomain>,
}

impl TrustIndex {
    pub fn compile(policy: &[PolicyDomain]) -> Result<Self> {
        let mut index = TrustIndex::default();
        for entry in policy {
            index.add(entry)?;
        }
        Ok(index)
    }

    pub fn add(&mut self, entry: &PolicyDomain) -> Result<()> {
        validate_domain(&entry.domain)
            .with_context(|| format!("Invalid policy domain: {}", entry.domain))?;

        let mut push = |len: Option<usize>, key: [u8; NAME_BUF]| -> Result<()> {
            let len = len.context("domain does not fit the name buffer")?;
            self.keys.push(CompiledKey {
                key,
                len,
                set_id: entry.set_id,
                source: entry.domain.clone(),
            });
            Ok(())
        };

        if let Some(name) = entry.domain.strip_prefix("*.") {
            let mut key = [0u8; NAME_BUF];
            push(subtree_key(name, &mut key), key)?;
        } else {
            let mut key = [0u8; NAME_BUF];
            push(exact_key(&entry.domain, &mut key), key)?;
            let mut key = [0u8; NAME_BUF];
            push(subtree_key(&entry.domain, &mut key), key)?;
        }

        if !self.domains.contains(entry) {
            self.domains.push(entry.clone());
        }
        Ok(())
    }

    pub fn remove(&mut self, domain: &str) {
        self.keys.retain(|k| k.source != domain);
        self.domains.retain(|d| d.domain != domain);
    }

    pub fn keys(&self) -> &[CompiledKey] {
        &self.keys
    }

    pub fn domains(&self) -> &[PolicyDomain] {
        &self.domains
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Reference longest-prefix match, byte-identical in semantics to the
    /// kernel trie lookup. Used to answer "which set would this domain
    /// land in" without touching the dataplane.
    pub fn longest_match(&self, domain: &str) -> Option<u64> {
        let lower = domain.to_ascii_lowercase();
        let bytes = lower.as_bytes();
        if bytes.is_empty() || bytes.len() >= NAME_BUF {
            return None;
        }
        let mut name = [0u8; NAME_BUF];
        name[..bytes.len()].copy_from_slice(bytes);
        let mut query = [0u8; NAME_BUF];
        let qlen = query_key(&name, bytes.len(), &mut query);

        self.keys
            .iter()
            .filter(|k| k.len <= qlen && k.key[..k.len] == query[..k.len])
            .max_by_key(|k| k.len)
            .map(|k| k.set_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, set_id: u64) -> PolicyDomain {
        PolicyDomain {
            domain: domain.to_string(),
            set_id,
        }
    }

    #[test]
    fn plain_domain_compiles_two_keys() {
        let index = TrustIndex::compile(&[entry("example.com", 7)]).unwrap();
        assert_eq!(index.keys().len(), 2);
        assert_eq!(index.domain_count(), 1);
    }

    #[test]
    fn matches_apex_and_subdomains() {
        let index = TrustIndex::compile(&[entry("example.com", 7)]).unwrap();
        assert_eq!(index.longest_match("example.com"), Some(7));
        assert_eq!(index.longest_match("api.example.com"), Some(7));
        assert_eq!(index.longest_match("EXAMPLE.COM"), Some(7));
        assert_eq!(index.longest_match("notexample.com"), None);
        assert_eq!(index.longest_match("example.org"), None);
    }

    #[test]
    fn wildcard_skips_the_apex() {
        let index = TrustIndex::compile(&[entry("*.example.com", 9)]).unwrap();
        assert_eq!(index.keys().len(), 1);
        assert_eq!(index.longest_match("example.com"), None);
        assert_eq!(index.longest_match("api.example.com"), Some(9));
    }

    #[test]
    fn most_specific_domain_wins() {
        let index = TrustIndex::compile(&[
            entry("example.com", 7),
            entry("sub.example.com", 9),
        ])
        .unwrap();
        assert_eq!(index.longest_match("a.sub.example.com"), Some(9));
        assert_eq!(index.longest_match("other.example.com"), Some(7));
    }

    #[test]
    fn remove_drops_all_keys_of_a_domain() {
        let mut index = TrustIndex::compile(&[entry("example.com", 7)]).unwrap();
        index.remove("example.com");
        assert!(index.keys().is_empty());
        assert_eq!(index.longest_match("example.com"), None);
    }

    #[test]
    fn invalid_domain_is_rejected() {
        assert!(TrustIndex::compile(&[entry("bad..name", 1)]).is_err());
    }
}
