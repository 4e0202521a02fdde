//! Error types for the node.

use crate::protocol::ErrorCode;
use murmur_core::NodeId;
use std::time::Duration;
use thiserror::Error;

/// Failures moving an envelope between endpoints.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),

    #[error("rpc to {dest} timed out after {after:?}")]
    Timeout { dest: NodeId, after: Duration },

    #[error("transport closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while handling a message.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unsupported message type: {0}")]
    NotSupported(String),

    #[error("unexpected {got} in reply to {request}")]
    UnexpectedReply { request: &'static str, got: &'static str },

    #[error("node not initialized: {0}")]
    Uninitialized(String),

    #[error("remote error {code}: {text}")]
    Remote { code: ErrorCode, text: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl NodeError {
    /// Code to put on the wire when this error answers a request.
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::Malformed(_) => ErrorCode::MalformedRequest,
            NodeError::NotSupported(_) => ErrorCode::NotSupported,
            NodeError::UnexpectedReply { .. } => ErrorCode::Crash,
            NodeError::Uninitialized(_) => ErrorCode::TemporarilyUnavailable,
            NodeError::Remote { code, .. } => *code,
            NodeError::Transport(TransportError::Timeout { .. }) => ErrorCode::Timeout,
            NodeError::Transport(TransportError::Unreachable(_)) => ErrorCode::NodeNotFound,
            NodeError::Transport(_) => ErrorCode::Crash,
        }
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
