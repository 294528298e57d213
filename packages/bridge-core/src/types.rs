use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a chain, unique across the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChainId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Pending,
    InFlight,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }
}

/// Canonical cross-chain message.
///
/// The `(source_chain, nonce)` pair identifies a message and never changes
/// once constructed; only the delivery status moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    source_chain: ChainId,
    destination_chain: ChainId,
    nonce: u64,
    payload: Vec<u8>,
    status: MessageStatus,
}

impl Message {
    pub fn new(
        source_chain: ChainId,
        destination_chain: ChainId,
        nonce: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source_chain,
            destination_chain,
            nonce,
            payload,
            status: MessageStatus::Pending,
        }
    }

    pub fn source_chain(&self) -> &ChainId {
        &self.source_chain
    }

    pub fn destination_chain(&self) -> &ChainId {
        &self.destination_chain
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Stable `source:nonce` identifier used in logs and operator events.
    pub fn id(&self) -> String {
        format!("{}:{}", self.source_chain, self.nonce)
    }

    pub(crate) fn set_status(&mut self, status: MessageStatus) {
        self.status = status;
    }
}

/// Position of an event on its source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventCursor {
    pub height: u64,
    pub index: u32,
}

impl EventCursor {
    pub fn new(height: u64, index: u32) -> Self {
        Self { height, index }
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.index)
    }
}

/// Undecoded chain event as produced by an adapter's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub chain_id: ChainId,
    pub cursor: EventCursor,
    pub topic: String,
    pub data: Vec<u8>,
}
