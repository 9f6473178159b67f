//! Two educational consensus engines sharing one cluster-of-five shape:
//! `lr` is a Raft-style leader-election/log-replication engine, `bft` is a
//! PBFT-style three-phase-commit engine with view-changes. `common` holds
//! the transport, wire framing, timers, config, and error types both
//! engines are built on.
pub mod bft;
pub mod common;
pub mod lr;
