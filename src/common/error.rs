use std::io;

/// Errors surfaced by the outbound call path (dialing a peer, waiting on a
/// reply). Per spec, these are always swallowed by the sender: a failed dial
/// just means one fewer vote/ack in the current round.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("dial to {0} timed out")]
    DialTimeout(String),

    #[error("call to {0} timed out")]
    CallTimeout(String),

    #[error("peer {0} is blacklisted")]
    Blacklisted(String),

    #[error("io error talking to {0}: {1}")]
    Io(String, #[source] io::Error),

    #[error("malformed reply from {0}: {1}")]
    Decode(String, #[source] serde_json::Error),
}

/// Errors from the log-blob persistence adapter. Never retried: the
/// in-memory log stays authoritative for the current process lifetime.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to create log directory {0}: {1}")]
    CreateDir(String, #[source] io::Error),

    #[error("failed to write log blob {0}: {1}")]
    Write(String, #[source] io::Error),

    #[error("failed to read log blob {0}: {1}")]
    Read(String, #[source] io::Error),

    #[error("failed to serialize log: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize log blob {0}: {1}")]
    Deserialize(String, #[source] serde_json::Error),
}
