//! View-change state machine: the timer that detects a stalled primary,
//! the backoff applied to repeated timeouts, and the quorum-driven
//! install of a new view. None of this has a counterpart in the retrieved
//! Go source (see the design notes) — it is implemented directly against
//! the protocol description.
use super::messages::{PbftMessage, PbftMessageKind};
use super::primary_for_view;
use super::server::{BftCore, BASE_TIMEOUT, MAX_TIMEOUT, QUORUM};
use std::sync::Arc;
use std::time::Instant;

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl BftCore {
    pub(crate) fn rearm_view_change_timer(self: &Arc<Self>) {
        let delay = self.state.lock().unwrap().current_timeout;
        let core = Arc::clone(self);
        self.view_change_timer.reset(delay, move || core.on_view_change_timeout());
    }

    fn on_view_change_timeout(self: Arc<Self>) {
        let fired = {
            let mut st = self.state.lock().unwrap();
            if st.is_malicious {
                None
            } else if st.last_active.elapsed() > st.current_timeout {
                let target_view = st.view + 1;
                st.current_timeout = std::cmp::min(st.current_timeout * 2, MAX_TIMEOUT);
                st.view_change_msgs
                    .entry(target_view)
                    .or_default()
                    .insert(self.me.clone());
                st.last_active = Instant::now();
                Some((target_view, st.current_timeout))
            } else {
                None
            }
        };
        if let Some((target_view, timeout)) = fired {
            self.event_sink.report(
                "TIMEOUT",
                &format!("no progress before {timeout:?}, starting view-change to view {target_view}"),
            );
            self.broadcast(PbftMessage {
                kind: PbftMessageKind::ViewChange,
                node_id: self.me.clone(),
                view: target_view,
                sequence: 0,
                block_hash: String::new(),
                prev_block_hash: String::new(),
                data: String::new(),
                timestamp: now_millis(),
            });
        }
        self.rearm_view_change_timer();
    }

    pub(crate) fn on_view_change(self: &Arc<Self>, msg: PbftMessage) {
        let should_install = {
            let mut st = self.state.lock().unwrap();
            let view = msg.view;
            if view <= st.view {
                return;
            }
            st.view_change_msgs
                .entry(view)
                .or_default()
                .insert(msg.node_id.clone());
            let count = st.view_change_msgs[&view].len();
            count >= QUORUM && primary_for_view(view) == self.me
        };
        if should_install {
            self.process_new_view(msg.view);
            self.broadcast(PbftMessage {
                kind: PbftMessageKind::NewView,
                node_id: self.me.clone(),
                view: msg.view,
                sequence: 0,
                block_hash: String::new(),
                prev_block_hash: String::new(),
                data: String::new(),
                timestamp: now_millis(),
            });
        }
    }

    pub(crate) fn on_new_view(self: &Arc<Self>, msg: PbftMessage) {
        let should_install = self.state.lock().unwrap().view < msg.view;
        if should_install {
            self.process_new_view(msg.view);
        }
    }

    fn process_new_view(self: &Arc<Self>, view: i64) {
        {
            let mut st = self.state.lock().unwrap();
            st.view = view;
            st.current_timeout = BASE_TIMEOUT;
            st.view_change_msgs.clear();
            st.last_active = Instant::now();
        }
        self.event_sink.report("VIEW", &format!("now in view {view}"));
        self.rearm_view_change_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::super::messages::{NodeId, PbftResponse};
    use super::*;
    use crate::bft::server::LoggingEventSink;
    use crate::common::error::TransportError;
    use crate::common::transport::Transport;
    use std::time::Duration;

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
    fn view_change_quorum_installs_new_view_at_next_primary() {
        let n = node("node2");
        for id in ["node1", "node3", "node4"] {
            n.on_view_change(PbftMessage {
                kind: PbftMessageKind::ViewChange,
                node_id: id.into(),
                view: 2,
                sequence: 0,
                block_hash: String::new(),
                prev_block_hash: String::new(),
                data: String::new(),
                timestamp: 0,
            });
        }
        assert_eq!(n.status().view, 2);
    }

    #[test]
    fn stale_view_change_is_ignored() {
        let n = node("node2");
        n.on_view_change(PbftMessage {
            kind: PbftMessageKind::ViewChange,
            node_id: "node1".into(),
            view: 0,
            sequence: 0,
            block_hash: String::new(),
            prev_block_hash: String::new(),
            data: String::new(),
            timestamp: 0,
        });
        assert_eq!(n.status().view, 1);
    }

    #[test]
    fn new_view_message_jumps_a_lagging_node_forward() {
        let n = node("node3");
        n.on_new_view(PbftMessage {
            kind: PbftMessageKind::NewView,
            node_id: "node2".into(),
            view: 4,
            sequence: 0,
            block_hash: String::new(),
            prev_block_hash: String::new(),
            data: String::new(),
            timestamp: 0,
        });
        assert_eq!(n.status().view, 4);
    }
}
