//! Byzantine-fault-tolerant three-phase commit ("BFT", spec.md §4.2): a
//! PBFT-style PrePrepare/Prepare/Commit pipeline over a fixed five-node
//! cluster, with view-changes triggered by an exponential-backoff timer and
//! a fast-catchup shortcut for peers that fall behind.
pub mod messages;
pub mod server;
pub mod view_change;

pub use messages::{NodeId, PbftMessage, PbftMessageKind, PbftResponse};
pub use server::{BftCore, BftEventSink, BftStatus, LoggingEventSink, QUORUM, TOTAL_NODES};

use serde::{Deserialize, Serialize};

pub const FAULTS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub sequence: i64,
    pub prev_hash: String,
    pub hash: String,
    pub data: String,
}

pub fn genesis_block() -> Block {
    Block {
        sequence: 0,
        prev_hash: "0000".to_string(),
        hash: "Genesis-Hash".to_string(),
        data: "Genesis".to_string(),
    }
}

/// Nodes are named `node1`..`node5`; the primary for a given view is
/// `((view - 1) mod 5) + 1`, round-robin over the fixed membership.
pub fn primary_for_view(view: i64) -> NodeId {
    let idx = (view - 1).rem_euclid(TOTAL_NODES as i64) + 1;
    format!("node{idx}")
}

pub fn node_index(id: &str) -> Option<i64> {
    id.strip_prefix("node").and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_round_robins_over_five_nodes() {
        assert_eq!(primary_for_view(1), "node1");
        assert_eq!(primary_for_view(5), "node5");
        assert_eq!(primary_for_view(6), "node1");
    }

    #[test]
    fn node_index_parses_trailing_digit() {
        assert_eq!(node_index("node3"), Some(3));
        assert_eq!(node_index("bogus"), None);
    }
}
