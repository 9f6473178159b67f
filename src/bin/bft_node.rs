//! Standalone BFT peer process: loads a cluster config and serves the
//! PrePrepare/Prepare/Commit/ViewChange/NewView pipeline over TCP.
//!
//! Usage: `bft_node <cluster-config.json>`
//!
//! Mirrors the original dashboard's `ConnectToPeers` startup grace period:
//! the process sleeps a second before arming its view-change timer, giving
//! the other four nodes in the fleet time to come up first.
use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use twin_consensus::bft::messages::NodeId;
use twin_consensus::bft::{BftCore, LoggingEventSink};
use twin_consensus::common::config::ClusterConfig;
use twin_consensus::common::transport::{serve, TcpTransport};

const STARTUP_DELAY: Duration = Duration::from_secs(1);

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| {
        eprintln!("usage: bft_node <cluster-config.json>");
        process::exit(1);
    });

    let raw = std::fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("reading {config_path}: {e}");
        process::exit(1);
    });
    let cfg: ClusterConfig<NodeId> = ClusterConfig::from_json_str(&raw).unwrap_or_else(|e| {
        eprintln!("parsing {config_path}: {e}");
        process::exit(1);
    });

    let my_addr: SocketAddr = cfg.peers[&cfg.me];
    let other_peers: Vec<NodeId> = cfg.peer_addrs().keys().cloned().collect();
    let transport = TcpTransport::new(cfg.peer_addrs());

    let core = BftCore::new(
        cfg.me.clone(),
        other_peers,
        Box::new(transport),
        Box::new(LoggingEventSink),
    );

    let startup_core = Arc::clone(&core);
    thread::spawn(move || {
        thread::sleep(STARTUP_DELAY);
        startup_core.start();
    });

    log::info!("bft node {} listening on {}", cfg.me, my_addr);
    run_server(core, my_addr);
}

fn run_server(core: Arc<BftCore>, addr: SocketAddr) {
    if let Err(e) = serve(addr, move |req| core.handle_pbft_message(req)) {
        eprintln!("bft node failed to serve on {addr}: {e}");
        process::exit(1);
    }
}
