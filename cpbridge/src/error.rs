//! Fault taxonomy for bridge exchanges.

use std::time::Duration;

use thiserror::Error;

/// Broad category of a [`BridgeError`].
///
/// Hosts use this to decide how to surface a failure without matching on
/// every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Connection-level failure. The exchange is lost.
    Transport,
    /// The worker sent something the client could not understand.
    Protocol,
    /// The worker rejected the pipeline text.
    Pipeline,
    /// The worker failed while executing a run.
    Worker,
    /// The caller asked for something the client cannot do in its current state.
    Usage,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] zeromq::ZmqError),

    #[error("connection closed by worker")]
    ConnectionClosed,

    #[error("timed out after {0:?} waiting for reply")]
    Timeout(Duration),

    #[error("invalid worker address '{0}': expected tcp://host:port or host:port")]
    InvalidAddress(String),

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reflected from a `pipeline-exception-1` reply.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Reflected from a `cellprofiler-exception-1` reply.
    #[error("worker error: {0}")]
    Worker(String),

    #[error("no pipeline loaded")]
    NoPipeline,

    #[error("no image supplied for channel '{0}'")]
    MissingChannel(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl BridgeError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Io(_)
            | Self::Socket(_)
            | Self::ConnectionClosed
            | Self::Timeout(_)
            | Self::InvalidAddress(_)
            | Self::NotConnected => FaultKind::Transport,
            Self::Protocol(_) => FaultKind::Protocol,
            Self::Pipeline(_) => FaultKind::Pipeline,
            Self::Worker(_) => FaultKind::Worker,
            Self::NoPipeline | Self::MissingChannel(_) | Self::InvalidImage(_) => FaultKind::Usage,
        }
    }

    /// Whether the request/reply pairing on the transport can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        self.kind() == FaultKind::Transport
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed JSON body: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
