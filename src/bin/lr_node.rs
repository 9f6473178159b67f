//! Standalone LR peer process: loads a cluster config, opens its log blob,
//! and serves RequestVote/AppendEntries/Propose/GetStatus over TCP.
//!
//! Usage: `lr_node <cluster-config.json> [logs-dir]`
use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use twin_consensus::common::config::ClusterConfig;
use twin_consensus::common::transport::{serve, TcpTransport};
use twin_consensus::lr::log::JsonFileLogStore;
use twin_consensus::lr::rpc::PeerId;
use twin_consensus::lr::LrCore;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| {
        eprintln!("usage: lr_node <cluster-config.json> [logs-dir]");
        process::exit(1);
    });
    let logs_dir = args.next().unwrap_or_else(|| "logs".to_string());

    let raw = std::fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("reading {config_path}: {e}");
        process::exit(1);
    });
    let cfg: ClusterConfig<PeerId> = ClusterConfig::from_json_str(&raw).unwrap_or_else(|e| {
        eprintln!("parsing {config_path}: {e}");
        process::exit(1);
    });

    let my_addr: SocketAddr = cfg.peers[&cfg.me];
    let other_peers: Vec<PeerId> = cfg.peer_addrs().keys().cloned().collect();
    let transport = TcpTransport::new(cfg.peer_addrs());
    let log_store = JsonFileLogStore::new(&logs_dir, cfg.me);

    let core = LrCore::new(cfg.me, other_peers, Box::new(log_store), Box::new(transport));
    core.start();

    log::info!("lr node {} listening on {}", cfg.me, my_addr);
    run_server(core, my_addr);
}

fn run_server(core: Arc<LrCore>, addr: SocketAddr) {
    if let Err(e) = serve(addr, move |req| core.dispatch(req)) {
        eprintln!("lr node failed to serve on {addr}: {e}");
        process::exit(1);
    }
}
