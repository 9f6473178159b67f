//! LR wire message shapes (spec.md §6, "RPC surface (LR)").
use super::log::LogEntry;
use serde::{Deserialize, Serialize};

pub type PeerId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: i64,
    pub candidate_id: PeerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub term: i64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: i64,
    pub leader_id: PeerId,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: i64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeArgs {
    pub command: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeReply {
    pub success: bool,
    pub leader_id: PeerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStateName {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for NodeStateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStateName::Follower => "Follower",
            NodeStateName::Candidate => "Candidate",
            NodeStateName::Leader => "Leader",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub id: PeerId,
    pub state: NodeStateName,
    pub term: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionArgs {
    pub isolated_node_ids: Vec<PeerId>,
}

/// Distinguishes a blacklist rejection from a denied vote/append, per
/// spec.md §7 ("`Partition` ... Non-fatal; caller treats as unreachable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum LrRpcError {
    #[error("caller is blacklisted")]
    Partition,
}

/// The single inbound request enum the LR listener dispatches on. The wire
/// framing (`common::wire`) doesn't care about RPC identity beyond this;
/// the dispatch itself is the normative part (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrRequest {
    RequestVote(RequestVoteArgs),
    AppendEntries(AppendEntriesArgs),
    Propose(ProposeArgs),
    GetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrResponse {
    RequestVote(Result<RequestVoteReply, LrRpcError>),
    AppendEntries(Result<AppendEntriesReply, LrRpcError>),
    Propose(ProposeReply),
    GetStatus(StatusReply),
}
