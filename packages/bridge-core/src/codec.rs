//! Canonical wire envelope for cross-chain messages.
//!
//! Messages travel between chains as a `bcs`-encoded [`Envelope`]. The
//! Blake2b-512 digest of that encoding is what signers sign and what logs
//! use as the message hash.

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};

use crate::{
    chain_adapter::DecodeError,
    types::{ChainId, Message},
    Error,
};

pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    pub source_chain: String,
    pub destination_chain: String,
    pub nonce: u64,
    pub payload: Vec<u8>,
}

impl From<&Message> for Envelope {
    fn from(message: &Message) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            source_chain: message.source_chain().to_string(),
            destination_chain: message.destination_chain().to_string(),
            nonce: message.nonce(),
            payload: message.payload().to_vec(),
        }
    }
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        bcs::to_bytes(&Envelope::from(self)).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decodes an envelope into a fresh `Pending` message.
    pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
        let envelope: Envelope = bcs::from_bytes(bytes)
            .map_err(|e| DecodeError::new(format!("malformed envelope: {}", e)))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(DecodeError::new(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        if envelope.source_chain.is_empty() || envelope.destination_chain.is_empty() {
            return Err(DecodeError::new("envelope is missing a chain identifier"));
        }

        Ok(Message::new(
            ChainId::new(envelope.source_chain),
            ChainId::new(envelope.destination_chain),
            envelope.nonce,
            envelope.payload,
        ))
    }

    pub fn digest(&self) -> Result<Vec<u8>, Error> {
        let bytes = self.encode()?;
        Ok(Blake2b512::digest(&bytes).to_vec())
    }
}
