//! Thin per-peer outbound RPC stub — the LR analogue of the teacher's
//! `Peer`/`PeerHandle`, minus the persistent actor thread: the teacher's
//! `send_append_entries`/`send_request_vote` already boiled down to "dial,
//! send one message, forward the reply", so here that's a direct blocking
//! call behind a deadline rather than a channel hop to a dedicated thread.
//! Fan-out across peers (the "asynchronously dial every peer" part of
//! spec.md §4.1) happens in `server.rs` via scoped threads, one per peer,
//! exactly mirroring the Go source's `go func(addr) {...}()` per call.
use super::rpc::{
    AppendEntriesArgs, AppendEntriesReply, LrRequest, LrResponse, PeerId, RequestVoteArgs,
    RequestVoteReply,
};
use crate::common::transport::Transport;
use std::time::Duration;

pub struct PeerClient<'t> {
    pub id: PeerId,
    transport: &'t (dyn Transport<PeerId, LrRequest, LrResponse> + Sync),
}

impl<'t> PeerClient<'t> {
    pub fn new(id: PeerId, transport: &'t (dyn Transport<PeerId, LrRequest, LrResponse> + Sync)) -> Self {
        PeerClient { id, transport }
    }

    /// Returns `None` on dial/call failure or an explicit `Partition`
    /// rejection — both are treated identically by the caller (spec.md
    /// §4.1 Failure semantics: "Dial / call timeouts are silently ignored
    /// by the sender").
    pub fn request_vote(&self, args: RequestVoteArgs, timeout: Duration) -> Option<RequestVoteReply> {
        match self
            .transport
            .call(&self.id, &LrRequest::RequestVote(args), timeout)
        {
            Ok(LrResponse::RequestVote(Ok(reply))) => Some(reply),
            _ => None,
        }
    }

    pub fn append_entries(&self, args: AppendEntriesArgs, timeout: Duration) -> Option<AppendEntriesReply> {
        match self
            .transport
            .call(&self.id, &LrRequest::AppendEntries(args), timeout)
        {
            Ok(LrResponse::AppendEntries(Ok(reply))) => Some(reply),
            _ => None,
        }
    }
}
