//! BFT wire message shapes (spec.md §6, "RPC surface (BFT)").
use serde::{Deserialize, Serialize};

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PbftMessageKind {
    PrePrepare,
    Prepare,
    Commit,
    ViewChange,
    NewView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbftMessage {
    pub kind: PbftMessageKind,
    pub node_id: NodeId,
    pub view: i64,
    pub sequence: i64,
    pub block_hash: String,
    pub prev_block_hash: String,
    pub data: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PbftResponse {
    pub success: bool,
}
