//! Outbound unary call stubs and inbound dispatch, generic over the two
//! engines' distinct message shapes.
//!
//! This plays the role the teacher's `rpc::client::Rpc` / `rpc::server::{
//! RpcObject, RpcServer}` pair plays in rusty-raft, minus the capnp wire
//! format (out of scope per spec.md §1 — "the RPC wire framing ... is
//! assumed; only message semantics are normative"). `TcpTransport` is the
//! real network implementation; `InMemoryTransport` is a same-process
//! double used by the scenario tests in `tests/`, so multi-peer timing
//! tests don't depend on actual sockets being free.

use crate::common::error::TransportError;
use crate::common::wire::{read_frame, write_frame};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outbound call stubs keyed by peer id. No ordering or delivery guarantee
/// is assumed: a peer not reachable within `timeout` simply returns an
/// error, which every caller in this crate treats as "no response this
/// round" rather than as a fatal condition.
pub trait Transport<K, Req, Resp>: Send + Sync {
    fn call(&self, peer: &K, req: &Req, timeout: Duration) -> Result<Resp, TransportError>;
}

/// Real network transport: one TCP round trip per call, length-prefixed
/// JSON framing (see `common::wire`). The connect and the read share the
/// caller-supplied deadline, matching spec.md's "100ms connect+call budget"
/// phrasing for LR and the 200ms BFT broadcast deadline.
pub struct TcpTransport<K> {
    addrs: HashMap<K, SocketAddr>,
}

impl<K: Eq + Hash + Clone> TcpTransport<K> {
    pub fn new(addrs: HashMap<K, SocketAddr>) -> Self {
        TcpTransport { addrs }
    }
}

impl<K, Req, Resp> Transport<K, Req, Resp> for TcpTransport<K>
where
    K: Eq + Hash + Clone + std::fmt::Display + Send + Sync,
    Req: Serialize,
    Resp: DeserializeOwned,
{
    fn call(&self, peer: &K, req: &Req, timeout: Duration) -> Result<Resp, TransportError> {
        let addr = self
            .addrs
            .get(peer)
            .ok_or_else(|| TransportError::DialTimeout(peer.to_string()))?;
        let mut stream = TcpStream::connect_timeout(addr, timeout)
            .map_err(|_| TransportError::DialTimeout(peer.to_string()))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| TransportError::Io(peer.to_string(), e))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| TransportError::Io(peer.to_string(), e))?;
        write_frame(&mut stream, req).map_err(|e| TransportError::Io(peer.to_string(), e))?;
        read_frame(&mut stream).map_err(|e| TransportError::Io(peer.to_string(), e))
    }
}

/// Accepts inbound connections on `addr`, reading one frame per connection
/// and dispatching to `handler`, then writing back whatever the handler
/// returns. Runs until the process exits; spawns one thread per connection,
/// matching the teacher's one-thread-per-peer actor style rather than an
/// event loop.
pub fn serve<Req, Resp, F>(addr: SocketAddr, handler: F) -> std::io::Result<()>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Resp + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr)?;
    let handler = Arc::new(handler);
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(_) => continue,
        };
        let handler = handler.clone();
        std::thread::spawn(move || {
            let req: Req = match read_frame(&mut stream) {
                Ok(r) => r,
                Err(_) => return,
            };
            let resp = handler(req);
            let _ = write_frame(&mut stream, &resp);
        });
    }
    Ok(())
}

type HandlerFn<Req, Resp> = dyn Fn(Req) -> Resp + Send + Sync;

/// An in-process stand-in for the network, used by tests. Every registered
/// peer's handler runs synchronously in the calling thread - no real
/// latency - so tests are deterministic unless they inject delay
/// themselves via `register_delay`.
pub struct InMemoryTransport<K, Req, Resp> {
    handlers: Mutex<HashMap<K, Arc<HandlerFn<Req, Resp>>>>,
    unreachable: Mutex<std::collections::HashSet<K>>,
}

impl<K, Req, Resp> InMemoryTransport<K, Req, Resp>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        InMemoryTransport {
            handlers: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn register<F>(&self, peer: K, handler: F)
    where
        F: Fn(Req) -> Resp + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(peer, Arc::new(handler));
    }

    /// Simulates a dead link: calls to `peer` will fail until
    /// `unreachable` is called again with a clean set.
    pub fn set_unreachable(&self, peer: K) {
        self.unreachable.lock().unwrap().insert(peer);
    }

    pub fn clear_unreachable(&self) {
        self.unreachable.lock().unwrap().clear();
    }
}

impl<K, Req, Resp> Default for InMemoryTransport<K, Req, Resp>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, Req, Resp> InMemoryTransport<K, Req, Resp>
where
    K: Eq + Hash + Clone + std::fmt::Display,
{
    /// `InMemoryTransport` takes the request by value (handlers are plain
    /// closures, not serialization targets), so it exposes this instead of
    /// implementing `Transport` directly over a borrowed `Req`.
    pub fn call_owned(&self, peer: &K, req: Req) -> Result<Resp, TransportError> {
        if self.unreachable.lock().unwrap().contains(peer) {
            return Err(TransportError::DialTimeout(peer.to_string()));
        }
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::DialTimeout(peer.to_string()))?;
        Ok(handler(req))
    }
}

/// Adapts a shared `InMemoryTransport` (cheaply `Clone`-able via `Arc`) to
/// the borrowed-`Req` `Transport` trait the consensus cores are written
/// against, so scenario tests can share one registry across every peer in
/// a simulated cluster without the cores needing to know tests don't use
/// real sockets.
#[derive(Clone)]
pub struct SharedInMemoryTransport<K, Req, Resp> {
    inner: Arc<InMemoryTransport<K, Req, Resp>>,
}

impl<K, Req, Resp> SharedInMemoryTransport<K, Req, Resp>
where
    K: Eq + Hash + Clone,
{
    pub fn new(inner: Arc<InMemoryTransport<K, Req, Resp>>) -> Self {
        SharedInMemoryTransport { inner }
    }
}

impl<K, Req, Resp> Transport<K, Req, Resp> for SharedInMemoryTransport<K, Req, Resp>
where
    K: Eq + Hash + Clone + std::fmt::Display + Send + Sync,
    Req: Clone + Send + Sync,
    Resp: Send + Sync,
{
    fn call(&self, peer: &K, req: &Req, _timeout: Duration) -> Result<Resp, TransportError> {
        self.inner.call_owned(peer, req.clone())
    }
}
