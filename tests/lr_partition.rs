//! Exercises the split-brain scenario from spec.md §8: a leader cut off
//! from the rest of the cluster should notice it can't reach quorum and
//! step back down to Follower within one heartbeat period.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use twin_consensus::common::transport::{InMemoryTransport, SharedInMemoryTransport};
use twin_consensus::lr::log::MemoryLogStore;
use twin_consensus::lr::rpc::{LrRequest, LrResponse, NodeStateName, PeerId};
use twin_consensus::lr::LrCore;

fn build_cluster() -> Vec<Arc<LrCore>> {
    let registry: Arc<InMemoryTransport<PeerId, LrRequest, LrResponse>> = Arc::new(InMemoryTransport::new());
    let ids: Vec<PeerId> = (0..5).collect();
    let cores: Vec<Arc<LrCore>> = ids
        .iter()
        .map(|&id| {
            let others: Vec<PeerId> = ids.iter().cloned().filter(|&p| p != id).collect();
            let transport = SharedInMemoryTransport::new(registry.clone());
            LrCore::new(id, others, Box::new(MemoryLogStore::new()), Box::new(transport))
        })
        .collect();
    for (&id, core) in ids.iter().zip(cores.iter()) {
        let core = core.clone();
        registry.register(id, move |req| core.dispatch(req));
    }
    cores
}

#[test]
fn isolated_leader_steps_down() {
    let cores = build_cluster();
    cores[0].force_leader();
    assert_eq!(cores[0].get_status().state, NodeStateName::Leader);

    cores[0].set_network_partition(vec![1, 2, 3, 4]);
    thread::sleep(Duration::from_millis(400));

    assert_eq!(cores[0].get_status().state, NodeStateName::Follower);
}

#[test]
fn clearing_the_partition_lets_a_new_leader_emerge() {
    let cores = build_cluster();
    for core in &cores {
        core.start();
    }
    thread::sleep(Duration::from_millis(1000));

    for core in &cores {
        core.set_network_partition(Vec::new());
    }
    thread::sleep(Duration::from_millis(200));

    let leaders = cores
        .iter()
        .filter(|c| c.get_status().state == NodeStateName::Leader)
        .count();
    assert_eq!(leaders, 1);
}
