//! Error types for the Node API
//!
//! Errors are split by whether retrying can help:
//!
//! - **Transient**: socket failures and a busy or restarting driver task
//! - **Permanent**: bad configuration, calls on a stopped node, unknown peers
//!
//! Nothing a remote peer sends can produce a `NodeError`; malformed datagrams
//! are logged and dropped inside the tunnel.

use crate::PeerId;
use lanlink_transport::TransportError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in Node operations
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    // ============ Transport Errors ============
    /// Failed to bind the UDP endpoint
    #[error("Transport initialization failed: {0}")]
    TransportInit(Cow<'static, str>),

    /// Socket operation failed
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),

    // ============ Configuration & State Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Operation not valid in the node's current state
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Peer id not registered
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    // ============ Operational Errors ============
    /// Driver task command channel closed or reply dropped
    #[error("Channel error: {0}")]
    Channel(Cow<'static, str>),

    /// Driver task failed to join
    #[error("Task join error: {0}")]
    TaskJoin(Cow<'static, str>),
}

impl NodeError {
    /// Returns true if this error is transient and may succeed on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Transport(_) | NodeError::Channel(_))
    }

    /// Returns true if this error will not succeed without intervention
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NodeError::InvalidConfig(_)
                | NodeError::InvalidState(_)
                | NodeError::PeerNotFound(_)
                | NodeError::TransportInit(_)
        )
    }

    /// Create a transport error with static context (zero allocation)
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        NodeError::Transport(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        NodeError::InvalidState(Cow::Borrowed(context))
    }

    /// Create a channel error with static context (zero allocation)
    #[must_use]
    pub const fn channel(context: &'static str) -> Self {
        NodeError::Channel(Cow::Borrowed(context))
    }
}

impl From<TransportError> for NodeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::BindFailed(msg) => NodeError::TransportInit(Cow::Owned(msg)),
            other => NodeError::Transport(Cow::Owned(other.to_string())),
        }
    }
}

/// Result type for Node operations
pub type Result<T> = std::result::Result<T, NodeError>;
