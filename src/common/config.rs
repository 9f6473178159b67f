//! Cluster topology configuration, shared shape for both engines.
//!
//! Mirrors the teacher's `server::Config` (`cluster: HashMap<u64,
//! SocketAddr>`, `me: (u64, SocketAddr)`) generalized over the peer-id type
//! so the same struct works for LR's `u64` ids and BFT's `"node<n>"`
//! string ids. CLI flag parsing and environment loading that would
//! normally populate this are out of scope per spec.md §1; only the type
//! and its `from_json_str` constructor are normative here.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig<K: Ord> {
    /// Every peer in the fixed five-node fleet, including `me`.
    pub peers: BTreeMap<K, SocketAddr>,
    pub me: K,
}

impl<K> ClusterConfig<K>
where
    K: Ord + Clone + serde::de::DeserializeOwned,
{
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Socket addresses of every peer except `me`.
    pub fn peer_addrs(&self) -> BTreeMap<K, SocketAddr> {
        self.peers
            .iter()
            .filter(|(id, _)| **id != self.me)
            .map(|(id, addr)| (id.clone(), *addr))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid cluster config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addrs_excludes_self() {
        let mut peers = BTreeMap::new();
        peers.insert(0u64, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        peers.insert(1u64, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
        let cfg = ClusterConfig { peers, me: 0u64 };
        let others = cfg.peer_addrs();
        assert_eq!(others.len(), 1);
        assert!(others.contains_key(&1));
    }

    #[test]
    fn parses_from_json() {
        let json = r#"{"peers": {"0": "127.0.0.1:9000", "1": "127.0.0.1:9001"}, "me": 0}"#;
        let cfg: ClusterConfig<u64> = ClusterConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.me, 0);
        assert_eq!(cfg.peers.len(), 2);
    }
}
