//! Wire messages exchanged between clients, controllers and nodes.
//!
//! Every message is an [`Envelope`] addressed from `src` to `dest`. Bodies
//! carry an optional `msg_id` (set on requests that expect an answer) and an
//! optional `in_reply_to` (set on answers), plus a `type`-tagged payload:
//!
//! ```json
//! {"src":"c1","dest":"n0","body":{"type":"broadcast","msg_id":3,"message":5}}
//! ```

use crate::error::NodeError;
use murmur_core::{NodeId, Topology, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload types this node understands.
pub const KNOWN_TYPES: &[&str] = &[
    "init",
    "init_ok",
    "broadcast",
    "broadcast_ok",
    "read",
    "read_ok",
    "topology",
    "topology_ok",
    "sync",
    "sync_ok",
    "generate",
    "generate_ok",
    "error",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

impl Envelope {
    pub fn new(src: NodeId, dest: NodeId, body: Body) -> Self {
        Self { src, dest, body }
    }

    /// Parse one line of the wire format.
    pub fn decode(line: &str) -> Result<Self, NodeError> {
        serde_json::from_str(line).map_err(|err| {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(raw) => match raw.pointer("/body/type").and_then(|t| t.as_str()) {
                    Some(kind) if !KNOWN_TYPES.contains(&kind) => {
                        NodeError::NotSupported(kind.to_string())
                    }
                    _ => NodeError::Malformed(err.to_string()),
                },
                Err(_) => NodeError::Malformed(err.to_string()),
            }
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Build an `error` answer for a line that failed to decode, if enough
    /// of it survives to address one.
    pub fn rejection(line: &str, error: &NodeError) -> Option<Self> {
        let raw: serde_json::Value = serde_json::from_str(line).ok()?;
        let src = raw.get("src")?.as_str()?;
        let dest = raw.get("dest")?.as_str()?;
        let msg_id = raw.pointer("/body/msg_id")?.as_u64()?;
        Some(Self::new(
            NodeId::from(dest),
            NodeId::from(src),
            Body::reply(
                msg_id,
                Payload::Error {
                    code: error.code(),
                    text: error.to_string(),
                },
            ),
        ))
    }

    /// Answer addressed back to the sender of this envelope.
    pub fn answer(&self, payload: Payload) -> Option<Self> {
        let msg_id = self.body.msg_id?;
        Some(Self::new(
            self.dest.clone(),
            self.src.clone(),
            Body::reply(msg_id, payload),
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    /// A body that expects no answer.
    pub fn notify(payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    pub fn request(msg_id: u64, payload: Payload) -> Self {
        Self {
            msg_id: Some(msg_id),
            in_reply_to: None,
            payload,
        }
    }

    pub fn reply(in_reply_to: u64, payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: Some(in_reply_to),
            payload,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Broadcast {
        message: Value,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<Value>,
    },
    Topology {
        topology: Topology,
    },
    TopologyOk,
    Sync {
        messages: Vec<Value>,
    },
    SyncOk {
        messages: Vec<Value>,
    },
    Generate,
    GenerateOk {
        id: String,
    },
    Error {
        code: ErrorCode,
        text: String,
    },
}

impl Payload {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::Sync { .. } => "sync",
            Payload::SyncOk { .. } => "sync_ok",
            Payload::Generate => "generate",
            Payload::GenerateOk { .. } => "generate_ok",
            Payload::Error { .. } => "error",
        }
    }
}

/// Protocol error codes, numbered as on the Maelstrom wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ErrorCode {
    Timeout,
    NodeNotFound,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Other(u32),
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => ErrorCode::Timeout,
            1 => ErrorCode::NodeNotFound,
            10 => ErrorCode::NotSupported,
            11 => ErrorCode::TemporarilyUnavailable,
            12 => ErrorCode::MalformedRequest,
            13 => ErrorCode::Crash,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Timeout => 0,
            ErrorCode::NodeNotFound => 1,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}
