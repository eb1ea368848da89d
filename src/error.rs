use std::io;

use thiserror::Error;

/// Wire-level `{code, message, data}` as sent by the browser for a failed
/// call.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// `IDNotFound` and friends: the `-32000` family. Carries the domain object
/// (a frame, an execution context, a node) that was referenced but is no
/// longer live, so callers can decide whether to retry.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("id not found: {message}")]
pub struct IdNotFound {
    pub message: String,
}

/// Thrown when `evaluate`'s shim reports the script itself raised.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{frame}] {message}")]
pub struct JavaScriptError {
    pub frame: String,
    pub message: String,
}

/// The root error type of this crate.
///
/// Mirrors the way the teacher crate centralizes wire, I/O, and codec errors
/// into one `CdpError`, extended with the protocol error taxonomy spec'd in
/// §7: a `ProtocolError` base with three families dispatched off the wire
/// error code (`-32000`, `-32601`, `-32602`), plus the handler-framework
/// signals `MessageNotHandled`, `ConnectionClosed` and `Timeout`.
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("{0}")]
    Ws(#[from] tungstenite::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// `code == -32000`: the referenced id (execution context, node, …) is
    /// gone. Retriable by the caller.
    #[error(transparent)]
    IdNotFound(#[from] IdNotFound),

    /// `code == -32601`: the peer doesn't implement this method. Tolerated
    /// at `on_attached` time to downgrade optional functionality.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// `code == -32602`: caller passed bad parameters. Not retriable.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Any other wire error code.
    #[error(transparent)]
    Protocol(#[from] WireError),

    /// A handler's `on_recv_notify_msg` asked the dispatch thread to try the
    /// notification again later because a referenced entity isn't mirrored
    /// yet.
    #[error("message not handled, schedule for retry")]
    MessageNotHandled,

    /// The transport has been torn down; no further requests can complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// A blocking wait exceeded its budget.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error(transparent)]
    JavaScript(#[from] JavaScriptError),

    /// Alias of `IdNotFound` for DOM call sites, kept as a distinct variant
    /// so `DOMHandler` call sites can match on it directly.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl CdpError {
    /// The code→factory table spec.md §9 asks for: classifies a wire error
    /// into the right `CdpError` subclass.
    pub fn from_wire(err: WireError) -> Self {
        match err.code {
            -32000 => CdpError::IdNotFound(IdNotFound { message: err.message }),
            -32601 => CdpError::MethodNotFound(err.message),
            -32602 => CdpError::InvalidParameters(err.message),
            _ => CdpError::Protocol(err),
        }
    }

    /// True for errors that tolerate a short-poll retry (id races, the
    /// handler not being ready yet).
    pub fn is_retriable(&self) -> bool {
        matches!(self, CdpError::IdNotFound(_) | CdpError::MessageNotHandled)
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;
