//! Leader-election-based log replication ("LR", spec.md §4.1): a Raft-style
//! engine with randomized election timeouts, a heartbeat-driven leader
//! lease, and a blacklist used to simulate network partitions.
pub mod log;
pub mod peer;
pub mod rpc;
pub mod server;

pub use rpc::PeerId;
pub use server::{LrCore, QUORUM};
