//! Five in-process BFT peers: the view-1 primary proposes a block and
//! every honest node should commit it via the PrePrepare/Prepare/Commit
//! pipeline (spec.md §8, "BFT happy path").
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use twin_consensus::bft::messages::{NodeId, PbftMessage, PbftResponse};
use twin_consensus::bft::{BftCore, LoggingEventSink};
use twin_consensus::common::transport::{InMemoryTransport, SharedInMemoryTransport};

fn build_cluster() -> Vec<Arc<BftCore>> {
    let registry: Arc<InMemoryTransport<NodeId, PbftMessage, PbftResponse>> = Arc::new(InMemoryTransport::new());
    let ids: Vec<NodeId> = (1..=5).map(|i| format!("node{i}")).collect();
    let cores: Vec<Arc<BftCore>> = ids
        .iter()
        .map(|id| {
            let others: Vec<NodeId> = ids.iter().cloned().filter(|p| p != id).collect();
            let transport = SharedInMemoryTransport::new(registry.clone());
            BftCore::new(id.clone(), others, Box::new(transport), Box::new(LoggingEventSink))
        })
        .collect();
    for (id, core) in ids.iter().zip(cores.iter()) {
        let core = core.clone();
        registry.register(id.clone(), move |req| core.handle_pbft_message(req));
    }
    cores
}

#[test]
fn primary_proposal_commits_on_every_honest_node() {
    let cores = build_cluster();
    cores[0].start_consensus().expect("node1 is the view-1 primary");

    thread::sleep(Duration::from_millis(500));

    for core in &cores {
        let status = core.status();
        assert_eq!(status.sequence, 1);
        assert_eq!(status.chain_len, 2);
    }
}

#[test]
fn backup_cannot_start_consensus() {
    let cores = build_cluster();
    let err = cores[1].start_consensus().unwrap_err();
    assert_eq!(format!("{err}"), "not the primary for the current view");
}
