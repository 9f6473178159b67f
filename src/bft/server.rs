//! The three-phase commit core: per-sequence Prepare/Commit vote tallies,
//! the append-only block chain, and the malicious/honest toggle used to
//! inject Byzantine behavior for tests. View-change handling lives in
//! `view_change.rs`; this file owns everything else `HandlePbftMessage`
//! dispatches to.
use super::messages::{NodeId, PbftMessage, PbftMessageKind, PbftResponse};
use super::{genesis_block, primary_for_view, Block, FAULTS};
use crate::common::timer::Timer;
use crate::common::transport::Transport;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const TOTAL_NODES: usize = 5;
pub const QUORUM: usize = 2 * FAULTS + 1;

pub(crate) const BASE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const BROADCAST_DEADLINE: Duration = Duration::from_millis(200);
pub(crate) const SELF_DELIVERY_DELAY: Duration = Duration::from_millis(5);

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BftError {
    #[error("not the primary for the current view")]
    NotPrimary,
    #[error("node is configured malicious and refuses to propose")]
    MaliciousRefusal,
}

/// Seam replacing the original dashboard's HTTP `report()` calls — the only
/// shipped implementation logs via the `log` crate, but tests or an
/// alternate frontend can supply their own.
pub trait BftEventSink: Send + Sync {
    fn report(&self, event: &str, message: &str);
}

pub struct LoggingEventSink;

impl BftEventSink for LoggingEventSink {
    fn report(&self, event: &str, message: &str) {
        log::info!("[{event}] {message}");
    }
}

#[derive(Debug, Clone)]
pub struct BftStatus {
    pub view: i64,
    pub sequence: i64,
    pub chain_len: usize,
    pub is_malicious: bool,
    pub current_timeout: Duration,
}

struct BftState {
    view: i64,
    sequence: i64,
    blockchain: Vec<Block>,
    prepare_msgs: HashMap<i64, HashMap<NodeId, PbftMessage>>,
    commit_msgs: HashMap<i64, HashMap<NodeId, PbftMessage>>,
    commit_broadcast_sent: HashSet<(i64, String)>,
    committed: HashSet<i64>,
    view_change_msgs: HashMap<i64, HashSet<NodeId>>,
    is_malicious: bool,
    current_timeout: Duration,
    last_active: Instant,
}

impl BftState {
    fn fresh() -> Self {
        BftState {
            view: 1,
            sequence: 0,
            blockchain: vec![genesis_block()],
            prepare_msgs: HashMap::new(),
            commit_msgs: HashMap::new(),
            commit_broadcast_sent: HashSet::new(),
            committed: HashSet::new(),
            view_change_msgs: HashMap::new(),
            is_malicious: false,
            current_timeout: BASE_TIMEOUT,
            last_active: Instant::now(),
        }
    }
}

pub struct BftCore {
    pub(crate) me: NodeId,
    pub(crate) peers: Vec<NodeId>,
    pub(crate) state: Mutex<BftState>,
    pub(crate) transport: Box<dyn Transport<NodeId, PbftMessage, PbftResponse> + Send + Sync>,
    pub(crate) event_sink: Box<dyn BftEventSink>,
    pub(crate) view_change_timer: Timer,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

impl BftCore {
    pub fn new(
        me: NodeId,
        peers: Vec<NodeId>,
        transport: Box<dyn Transport<NodeId, PbftMessage, PbftResponse> + Send + Sync>,
        event_sink: Box<dyn BftEventSink>,
    ) -> Arc<Self> {
        assert_eq!(peers.len() + 1, TOTAL_NODES, "BFT cluster is fixed at five nodes");
        Arc::new(BftCore {
            me,
            peers,
            state: Mutex::new(BftState::fresh()),
            transport,
            event_sink,
            view_change_timer: Timer::new(),
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.rearm_view_change_timer();
    }

    pub fn status(&self) -> BftStatus {
        let st = self.state.lock().unwrap();
        BftStatus {
            view: st.view,
            sequence: st.sequence,
            chain_len: st.blockchain.len(),
            is_malicious: st.is_malicious,
            current_timeout: st.current_timeout,
        }
    }

    /// Primary-only: mints the next block and kicks off PrePrepare.
    pub fn start_consensus(self: &Arc<Self>) -> Result<(), BftError> {
        let msg = {
            let st = self.state.lock().unwrap();
            if st.is_malicious {
                return Err(BftError::MaliciousRefusal);
            }
            if primary_for_view(st.view) != self.me {
                return Err(BftError::NotPrimary);
            }
            let sequence = st.sequence + 1;
            let prev = st.blockchain.last().expect("genesis block always present");
            let data = format!("Block #{sequence} Data");
            let hash_input = format!("{}{}{}{}", sequence, prev.hash, data, now_nanos());
            let block_hash = sha256_hex(hash_input.as_bytes());
            PbftMessage {
                kind: PbftMessageKind::PrePrepare,
                node_id: self.me.clone(),
                view: st.view,
                sequence,
                block_hash,
                prev_block_hash: prev.hash.clone(),
                data,
                timestamp: now_millis(),
            }
        };
        self.event_sink
            .report("START", &format!("primary proposed block #{}", msg.sequence));
        self.broadcast(msg);
        Ok(())
    }

    pub fn set_malicious(self: &Arc<Self>, malicious: bool) {
        let was = {
            let mut st = self.state.lock().unwrap();
            let was = st.is_malicious;
            st.is_malicious = malicious;
            was
        };
        if malicious && !was {
            self.event_sink.report("CONFIG", "became malicious (Byzantine)");
        } else if !malicious && was {
            {
                let mut st = self.state.lock().unwrap();
                st.current_timeout = BASE_TIMEOUT;
                st.last_active = Instant::now();
            }
            self.event_sink.report("CONFIG", "became honest");
            self.rearm_view_change_timer();
        }
    }

    pub fn reset(self: &Arc<Self>) {
        {
            let mut st = self.state.lock().unwrap();
            *st = BftState::fresh();
        }
        self.event_sink.report("RESET", "system reset");
        self.rearm_view_change_timer();
    }

    pub fn handle_pbft_message(self: &Arc<Self>, msg: PbftMessage) -> PbftResponse {
        {
            let st = self.state.lock().unwrap();
            if st.is_malicious {
                return PbftResponse { success: false };
            }
        }
        // ViewChange is one unverified vote, not a legitimate view; excluded
        // so on_view_change's own quorum count can accumulate across senders.
        let eligible_for_catchup = !matches!(msg.kind, PbftMessageKind::ViewChange);
        let caught_up = {
            let mut st = self.state.lock().unwrap();
            let caught_up = eligible_for_catchup && msg.view > st.view;
            if caught_up {
                st.view = msg.view;
                st.current_timeout = BASE_TIMEOUT;
            }
            st.last_active = Instant::now();
            caught_up
        };
        if caught_up {
            self.event_sink
                .report("CATCHUP", &format!("fast-forwarded to view {}", msg.view));
        }
        match msg.kind {
            PbftMessageKind::PrePrepare => self.on_pre_prepare(msg),
            PbftMessageKind::Prepare => self.on_prepare(msg),
            PbftMessageKind::Commit => self.on_commit(msg),
            PbftMessageKind::ViewChange => self.on_view_change(msg),
            PbftMessageKind::NewView => self.on_new_view(msg),
        }
        PbftResponse { success: true }
    }

    fn on_pre_prepare(self: &Arc<Self>, msg: PbftMessage) {
        let prepare_msg = {
            let st = self.state.lock().unwrap();
            if msg.view != st.view || msg.sequence <= st.sequence {
                return;
            }
            PbftMessage {
                kind: PbftMessageKind::Prepare,
                node_id: self.me.clone(),
                view: msg.view,
                sequence: msg.sequence,
                block_hash: msg.block_hash.clone(),
                prev_block_hash: msg.prev_block_hash.clone(),
                data: String::new(),
                timestamp: now_millis(),
            }
        };
        self.event_sink
            .report("PRE-PREPARE", &format!("accepted block #{}", msg.sequence));
        self.broadcast(prepare_msg);
    }

    fn on_prepare(self: &Arc<Self>, msg: PbftMessage) {
        let commit_msg = {
            let mut st = self.state.lock().unwrap();
            if msg.view != st.view {
                return;
            }
            let seq = msg.sequence;
            let hash = msg.block_hash.clone();
            st.prepare_msgs
                .entry(seq)
                .or_default()
                .insert(msg.node_id.clone(), msg.clone());
            let count = st.prepare_msgs[&seq]
                .values()
                .filter(|m| m.block_hash == hash)
                .count();
            let key = (seq, hash.clone());
            if count < QUORUM || st.committed.contains(&seq) || st.commit_broadcast_sent.contains(&key) {
                return;
            }
            st.commit_broadcast_sent.insert(key);
            PbftMessage {
                kind: PbftMessageKind::Commit,
                node_id: self.me.clone(),
                view: msg.view,
                sequence: seq,
                block_hash: hash,
                prev_block_hash: msg.prev_block_hash.clone(),
                data: String::new(),
                timestamp: now_millis(),
            }
        };
        self.event_sink
            .report("PREPARED", &format!("quorum reached for block #{}", commit_msg.sequence));
        self.broadcast(commit_msg);
    }

    fn on_commit(self: &Arc<Self>, msg: PbftMessage) {
        let committed_seq = {
            let mut st = self.state.lock().unwrap();
            if msg.view != st.view || st.committed.contains(&msg.sequence) {
                return;
            }
            let seq = msg.sequence;
            let hash = msg.block_hash.clone();
            st.commit_msgs
                .entry(seq)
                .or_default()
                .insert(msg.node_id.clone(), msg.clone());
            let count = st.commit_msgs[&seq]
                .values()
                .filter(|m| m.block_hash == hash)
                .count();
            if count < QUORUM {
                return;
            }
            st.committed.insert(seq);
            st.sequence = seq;
            st.blockchain.push(Block {
                sequence: seq,
                prev_hash: msg.prev_block_hash.clone(),
                hash,
                data: format!("Block #{seq}"),
            });
            st.current_timeout = BASE_TIMEOUT;
            seq
        };
        self.event_sink
            .report("COMMITTED", &format!("+++ block #{committed_seq} committed +++"));
        self.rearm_view_change_timer();
    }

    pub(crate) fn broadcast(self: &Arc<Self>, msg: PbftMessage) {
        let core = Arc::clone(self);
        let peers = self.peers.clone();
        let fanout_msg = msg.clone();
        std::thread::spawn(move || {
            std::thread::scope(|scope| {
                for peer in &peers {
                    let core = &core;
                    let msg = fanout_msg.clone();
                    scope.spawn(move || {
                        let _ = core.transport.call(peer, &msg, BROADCAST_DEADLINE);
                    });
                }
            });
        });
        let core = Arc::clone(self);
        std::thread::spawn(move || {
            std::thread::sleep(SELF_DELIVERY_DELAY);
            core.handle_pbft_message(msg);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::TransportError;

    struct NullTransport;

    impl Transport<NodeId, PbftMessage, PbftResponse> for NullTransport {
        fn call(&self, peer: &NodeId, _req: &PbftMessage, _timeout: Duration) -> Result<PbftResponse, TransportError> {
            Err(TransportError::DialTimeout(peer.clone()))
        }
    }

    fn node(id: &str) -> Arc<BftCore> {
        let peers = (1..=5)
            .map(|i| format!("node{i}"))
            .filter(|p| p != id)
            .collect();
        BftCore::new(id.to_string(), peers, Box::new(NullTransport), Box::new(LoggingEventSink))
    }

    #[test]
    fn only_the_view_primary_can_start_consensus() {
        let primary = node("node1");
        assert!(primary.start_consensus().is_ok());

        let backup = node("node2");
        assert_eq!(backup.start_consensus(), Err(BftError::NotPrimary));
    }

    #[test]
    fn malicious_primary_refuses_to_propose() {
        let primary = node("node1");
        primary.set_malicious(true);
        assert_eq!(primary.start_consensus(), Err(BftError::MaliciousRefusal));
    }

    #[test]
    fn malicious_node_drops_every_inbound_message() {
        let n = node("node2");
        n.set_malicious(true);
        let reply = n.handle_pbft_message(PbftMessage {
            kind: PbftMessageKind::PrePrepare,
            node_id: "node1".into(),
            view: 1,
            sequence: 1,
            block_hash: "h".into(),
            prev_block_hash: "Genesis-Hash".into(),
            data: "d".into(),
            timestamp: 0,
        });
        assert!(!reply.success);
        assert_eq!(n.status().chain_len, 1);
    }

    #[test]
    fn prepare_quorum_triggers_commit_broadcast_only_once() {
        let n = node("node3");
        for id in ["node1", "node2", "node4"] {
            n.on_prepare(PbftMessage {
                kind: PbftMessageKind::Prepare,
                node_id: id.into(),
                view: 1,
                sequence: 1,
                block_hash: "h".into(),
                prev_block_hash: "Genesis-Hash".into(),
                data: String::new(),
                timestamp: 0,
            });
        }
        let st = n.state.lock().unwrap();
        assert!(st.commit_broadcast_sent.contains(&(1, "h".to_string())));
    }
}
