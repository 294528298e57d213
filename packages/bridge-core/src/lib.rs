pub mod config;
pub mod types;
pub mod codec;
pub mod signer;
pub mod chain_adapter;
pub mod relayer;

pub use config::{Config, ChainConfig, EventFilter, RelayerConfig};
pub use types::{ChainId, EventCursor, Message, MessageStatus, RawEvent};
pub use chain_adapter::{ChainAdapter, DecodeError, SubmitError, SubmitReceipt};
pub use relayer::{EventSink, RelayerEvent, Router, ShutdownReport};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Chain {0} is already registered")]
    AlreadyRegistered(ChainId),

    #[error("Router has already been started")]
    AlreadyStarted,

    #[error("Router is not running")]
    NotStarted,

    #[error("Message {id} is unroutable: no adapter registered for chain {destination}")]
    UnroutableMessage { id: String, destination: ChainId },

    #[error("Interrupted by shutdown: {0}")]
    Interrupted(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
