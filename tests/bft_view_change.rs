//! A malicious view-1 primary never proposes, so the other four nodes
//! should time out, vote in a view-change, and hand the primary role to
//! node2 (spec.md §8, "malicious primary view change"). The view-change
//! timeout is a fixed 5s per node, so this test genuinely takes a few
//! seconds of wall time.
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
fn malicious_primary_is_replaced_by_view_change() {
    let cores = build_cluster();
    cores[0].set_malicious(true);
    for core in &cores {
        core.start();
    }

    thread::sleep(Duration::from_millis(6500));

    for core in cores.iter().skip(1) {
        assert_eq!(core.status().view, 2, "honest nodes should have installed view 2");
    }

    cores[1]
        .start_consensus()
        .expect("node2 is the view-2 primary and can now propose");
    thread::sleep(Duration::from_millis(300));

    for core in cores.iter().skip(1) {
        assert_eq!(core.status().chain_len, 2);
    }
}
