//! The LR consensus core (spec.md §4.1): election, heartbeat, and the
//! handful of inbound RPCs, all serialized by one mutex the way spec.md §5
//! requires ("The core is protected by a single per-node mutex guarding
//! all mutable consensus state"). Outbound calls always happen with that
//! mutex released, fanned out one thread per peer via `std::thread::scope`
//! — the direct descendant of the teacher's `Peer`/channel machinery and
//! of the Go source's `go func(addr) {...}()` per-call goroutines.
use super::log::{LogEntry, LogStore};
use super::peer::PeerClient;
use super::rpc::{
    AppendEntriesArgs, AppendEntriesReply, LrRequest, LrResponse, LrRpcError, NodeStateName,
    PeerId, ProposeReply, RequestVoteArgs, RequestVoteReply, StatusReply,
};
use crate::common::timer::Timer;
use crate::common::transport::Transport;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// 3 of 5 — see spec.md §3 "Derived constants" (the BFT quorum formula
/// applies equally here: a majority of five is three).
pub const QUORUM: usize = 3;
const CLUSTER_SIZE: usize = 5;

const ELECTION_TIMEOUT_MIN_MS: u64 = 400;
const ELECTION_TIMEOUT_MAX_MS: u64 = 800;
const HEARTBEAT_PERIOD: Duration = Duration::from_millis(150);
const REQUEST_VOTE_DEADLINE: Duration = Duration::from_millis(100);
const APPEND_ENTRIES_DEADLINE: Duration = Duration::from_millis(80);

struct LrState {
    node_state: NodeStateName,
    current_term: i64,
    voted_for: Option<PeerId>,
    log: Vec<LogEntry>,
    blacklist: HashSet<PeerId>,
}

/// A single LR peer: state, log, timer, and outbound transport bundled
/// behind one lock. Always constructed behind an `Arc` (`LrCore::new`
/// returns one) because the election timer and heartbeat loop both need to
/// hand a handle to themselves to a background thread.
pub struct LrCore {
    me: PeerId,
    other_peers: Vec<PeerId>,
    state: Mutex<LrState>,
    log_store: Box<dyn LogStore>,
    transport: Box<dyn Transport<PeerId, LrRequest, LrResponse> + Send + Sync>,
    election_timer: Timer,
}

impl LrCore {
    pub fn new(
        me: PeerId,
        other_peers: Vec<PeerId>,
        log_store: Box<dyn LogStore>,
        transport: Box<dyn Transport<PeerId, LrRequest, LrResponse> + Send + Sync>,
    ) -> Arc<Self> {
        assert_eq!(other_peers.len() + 1, CLUSTER_SIZE, "LR is a fixed five-peer cluster");
        let log = log_store.load().unwrap_or_else(|e| {
            log::warn!("node {} starting with empty log, load failed: {}", me, e);
            Vec::new()
        });
        Arc::new(LrCore {
            me,
            other_peers,
            state: Mutex::new(LrState {
                node_state: NodeStateName::Follower,
                current_term: 0,
                voted_for: None,
                log,
                blacklist: HashSet::new(),
            }),
            log_store,
            transport,
            election_timer: Timer::new(),
        })
    }

    /// Arms the follower-state election timeout. Must be called once after
    /// construction to bring the node to life; also re-armed on every
    /// follower-preserving event (vote grant, valid AppendEntries, step
    /// down) per spec.md §4.1.
    pub fn start(self: &Arc<Self>) {
        self.arm_election_timer();
    }

    fn arm_election_timer(self: &Arc<Self>) {
        let delay = Duration::from_millis(
            rand::thread_rng().gen_range(ELECTION_TIMEOUT_MIN_MS..ELECTION_TIMEOUT_MAX_MS),
        );
        let core = Arc::clone(self);
        self.election_timer.reset(delay, move || core.start_election());
    }

    fn reachable_peers(&self) -> Vec<PeerId> {
        let st = self.state.lock().unwrap();
        self.other_peers
            .iter()
            .cloned()
            .filter(|p| !st.blacklist.contains(p))
            .collect()
    }

    // ---- inbound RPCs (spec.md §4.1 Operations) ----

    pub fn handle_request_vote(&self, args: RequestVoteArgs) -> Result<RequestVoteReply, LrRpcError> {
        let (term, vote_granted) = {
            let mut st = self.state.lock().unwrap();
            if st.blacklist.contains(&args.candidate_id) {
                return Err(LrRpcError::Partition);
            }
            if args.term > st.current_term {
                st.current_term = args.term;
                st.node_state = NodeStateName::Follower;
                st.voted_for = None;
            }
            let grant = (st.voted_for.is_none() || st.voted_for == Some(args.candidate_id))
                && args.term >= st.current_term;
            if grant {
                st.voted_for = Some(args.candidate_id);
                log::debug!("node {} grants vote to {} for term {}", self.me, args.candidate_id, st.current_term);
            }
            (st.current_term, grant)
        };
        Ok(RequestVoteReply { term, vote_granted })
    }

    pub fn handle_append_entries(&self, args: AppendEntriesArgs) -> Result<AppendEntriesReply, LrRpcError> {
        let (term, success, new_log) = {
            let mut st = self.state.lock().unwrap();
            if st.blacklist.contains(&args.leader_id) {
                return Err(LrRpcError::Partition);
            }
            if args.term >= st.current_term {
                st.node_state = NodeStateName::Follower;
                st.current_term = args.term;
                let new_log = if args.entries.len() > st.log.len() {
                    st.log = args.entries.clone();
                    Some(st.log.clone())
                } else {
                    None
                };
                (st.current_term, true, new_log)
            } else {
                (st.current_term, false, None)
            }
        };
        if success {
            if let Some(log) = new_log {
                if let Err(e) = self.log_store.save(&log) {
                    log::warn!("node {} failed to persist replicated log: {}", self.me, e);
                }
            }
        }
        Ok(AppendEntriesReply { term, success })
    }

    pub fn propose(&self, command: Vec<u8>) -> ProposeReply {
        let (leader_id, snapshot) = {
            let mut st = self.state.lock().unwrap();
            if st.node_state != NodeStateName::Leader {
                return ProposeReply { success: false, leader_id: 0 };
            }
            let entry = LogEntry {
                term: st.current_term,
                index: st.log.len() as i64,
                command,
            };
            st.log.push(entry);
            (self.me, st.log.clone())
        };
        if let Err(e) = self.log_store.save(&snapshot) {
            log::warn!("node {} failed to persist proposed entry: {}", self.me, e);
        }
        ProposeReply { success: true, leader_id }
    }

    pub fn get_status(&self) -> StatusReply {
        let st = self.state.lock().unwrap();
        StatusReply {
            id: self.me,
            state: st.node_state,
            term: st.current_term,
        }
    }

    pub fn log_len(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    /// Demo-only shortcut (spec.md §4.1): jump straight to Leader without
    /// running an election. Never part of normal operation.
    pub fn force_leader(self: &Arc<Self>) {
        let term = {
            let mut st = self.state.lock().unwrap();
            st.current_term += 100;
            st.node_state = NodeStateName::Leader;
            st.current_term
        };
        log::info!("node {} force-promoted to leader, term {}", self.me, term);
        self.election_timer.cancel();
        let core = Arc::clone(self);
        thread::spawn(move || core.heartbeat_loop(term));
    }

    pub fn set_network_partition(&self, isolated: Vec<PeerId>) {
        let mut st = self.state.lock().unwrap();
        st.blacklist = isolated.into_iter().collect();
        log::info!("node {} blacklist set to {:?}", self.me, st.blacklist);
    }

    // ---- election (spec.md §4.1 Election) ----

    fn start_election(self: Arc<Self>) {
        let term = {
            let mut st = self.state.lock().unwrap();
            if st.node_state == NodeStateName::Leader {
                return;
            }
            st.node_state = NodeStateName::Candidate;
            st.current_term += 1;
            st.voted_for = Some(self.me);
            st.current_term
        };
        log::info!("node {} starting election for term {}", self.me, term);
        // Step 6: the timer is re-armed at the election's origin regardless
        // of whether any vote reply ever arrives.
        self.arm_election_timer();

        let peers = self.reachable_peers();
        let votes = AtomicUsize::new(1); // self-vote
        let became_leader = AtomicBool::new(false);
        thread::scope(|scope| {
            for peer_id in &peers {
                let core = &self;
                let votes = &votes;
                let became_leader = &became_leader;
                scope.spawn(move || {
                    let client = PeerClient::new(*peer_id, core.transport.as_ref());
                    let Some(reply) = client.request_vote(
                        RequestVoteArgs { term, candidate_id: core.me },
                        REQUEST_VOTE_DEADLINE,
                    ) else {
                        return;
                    };
                    if !(reply.vote_granted && reply.term == term) {
                        return;
                    }
                    let count = votes.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < QUORUM {
                        return;
                    }
                    let still_candidate = {
                        let st = core.state.lock().unwrap();
                        st.node_state == NodeStateName::Candidate && st.current_term == term
                    };
                    if still_candidate && !became_leader.swap(true, Ordering::SeqCst) {
                        core.clone().become_leader(term);
                    }
                });
            }
        });
    }

    fn become_leader(self: Arc<Self>, term: i64) {
        {
            let mut st = self.state.lock().unwrap();
            if st.node_state != NodeStateName::Candidate || st.current_term != term {
                return;
            }
            st.node_state = NodeStateName::Leader;
        }
        log::info!("node {} became leader for term {}", self.me, term);
        self.election_timer.cancel();
        let core = self.clone();
        thread::spawn(move || core.heartbeat_loop(term));
    }

    // ---- leader heartbeat loop (spec.md §4.1 Leader heartbeat loop) ----

    fn heartbeat_loop(self: Arc<Self>, term: i64) {
        loop {
            let log_snapshot = {
                let st = self.state.lock().unwrap();
                if st.node_state != NodeStateName::Leader || st.current_term != term {
                    return;
                }
                st.log.clone()
            };
            let peers = self.reachable_peers();
            let success = AtomicUsize::new(1); // self
            thread::scope(|scope| {
                for peer_id in &peers {
                    let core = &self;
                    let success = &success;
                    let entries = log_snapshot.clone();
                    scope.spawn(move || {
                        let client = PeerClient::new(*peer_id, core.transport.as_ref());
                        let Some(reply) = client.append_entries(
                            AppendEntriesArgs { term, leader_id: core.me, entries },
                            APPEND_ENTRIES_DEADLINE,
                        ) else {
                            return;
                        };
                        if reply.success {
                            success.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                }
            });

            if success.load(Ordering::SeqCst) < QUORUM {
                let mut st = self.state.lock().unwrap();
                if st.node_state == NodeStateName::Leader && st.current_term == term {
                    st.node_state = NodeStateName::Follower;
                    st.voted_for = None;
                    drop(st);
                    log::info!(
                        "node {} stepping down from leader (term {}): quorum of AppendEntries not acked",
                        self.me, term
                    );
                    self.arm_election_timer();
                }
                return;
            }
            thread::sleep(HEARTBEAT_PERIOD);
        }
    }

    /// Routes one inbound request to the matching handler. Used by the
    /// transport listener (`common::transport::serve`); requires `Arc<Self>`
    /// only because a granted vote re-arms the election timer, which needs
    /// a handle to spawn its own callback thread.
    pub fn dispatch(self: &Arc<Self>, req: LrRequest) -> LrResponse {
        match req {
            LrRequest::RequestVote(args) => {
                let result = self.handle_request_vote(args);
                if matches!(result, Ok(RequestVoteReply { vote_granted: true, .. })) {
                    self.arm_election_timer();
                }
                LrResponse::RequestVote(result)
            }
            LrRequest::AppendEntries(args) => {
                let result = self.handle_append_entries(args);
                if matches!(result, Ok(AppendEntriesReply { success: true, .. })) {
                    self.arm_election_timer();
                }
                LrResponse::AppendEntries(result)
            }
            LrRequest::Propose(args) => LrResponse::Propose(self.propose(args.command)),
            LrRequest::GetStatus => LrResponse::GetStatus(self.get_status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lr::log::MemoryLogStore;

    #[test]
    fn grants_vote_when_unvoted_and_resets_timer() {
        let core = LrCore::new(
            0,
            vec![1, 2, 3, 4],
            Box::new(MemoryLogStore::new()),
            Box::new(NoopTransport),
        );
        let reply = core
            .handle_request_vote(RequestVoteArgs { term: 1, candidate_id: 1 })
            .unwrap();
        assert!(reply.vote_granted);
        assert_eq!(reply.term, 1);

        // A second candidate in the same term is denied.
        let reply2 = core
            .handle_request_vote(RequestVoteArgs { term: 1, candidate_id: 2 })
            .unwrap();
        assert!(!reply2.vote_granted);
    }

    #[test]
    fn blacklisted_candidate_is_partitioned() {
        let core = LrCore::new(0, vec![1, 2, 3, 4], Box::new(MemoryLogStore::new()), Box::new(NoopTransport));
        core.set_network_partition(vec![1]);
        let err = core
            .handle_request_vote(RequestVoteArgs { term: 1, candidate_id: 1 })
            .unwrap_err();
        assert_eq!(err, LrRpcError::Partition);
    }

    #[test]
    fn append_entries_replaces_shorter_log_and_persists() {
        let log_store = Box::new(MemoryLogStore::new());
        let core = LrCore::new(0, vec![1, 2, 3, 4], log_store, Box::new(NoopTransport));
        let entries = vec![
            LogEntry { term: 1, index: 0, command: b"a".to_vec() },
            LogEntry { term: 1, index: 1, command: b"b".to_vec() },
        ];
        let reply = core
            .handle_append_entries(AppendEntriesArgs { term: 1, leader_id: 1, entries: entries.clone() })
            .unwrap();
        assert!(reply.success);
        assert_eq!(core.get_status().state, NodeStateName::Follower);

        // A shorter incoming log does not replace the existing one.
        let shorter = vec![entries[0].clone()];
        core.handle_append_entries(AppendEntriesArgs { term: 1, leader_id: 1, entries: shorter }).unwrap();
        let st = core.state.lock().unwrap();
        assert_eq!(st.log.len(), 2);
    }

    #[test]
    fn propose_requires_leadership() {
        let core = LrCore::new(0, vec![1, 2, 3, 4], Box::new(MemoryLogStore::new()), Box::new(NoopTransport));
        let reply = core.propose(b"x".to_vec());
        assert!(!reply.success);
        assert_eq!(reply.leader_id, 0);

        core.force_leader();
        let reply = core.propose(b"x".to_vec());
        assert!(reply.success);
        assert_eq!(reply.leader_id, 0);
    }

    /// A transport that always fails every outbound call — enough for the
    /// handler-level unit tests above, which never trigger a real fan-out.
    struct NoopTransport;
    impl Transport<PeerId, LrRequest, LrResponse> for NoopTransport {
        fn call(&self, peer: &PeerId, _req: &LrRequest, _timeout: Duration) -> Result<LrResponse, crate::common::error::TransportError> {
            Err(crate::common::error::TransportError::DialTimeout(peer.to_string()))
        }
    }
}
