use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use crate::{
    config::{ChainConfig, EventFilter},
    signer::MessageSigner,
    types::{ChainId, EventCursor, Message, RawEvent},
    Error,
};

/// Raw events as a restartable subscription. The stream ends, or yields an
/// error, when the underlying connection is lost.
pub type EventStream = BoxStream<'static, Result<RawEvent, Error>>;

/// Event that matched a subscription but does not fit the message schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Decode error: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The chain refused the payload; retrying cannot help.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Timeouts, connectivity and nonce contention.
    #[error("Transient: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmitReceipt {
    pub tx_hash: Option<String>,
}

/// Capabilities the relayer needs from one chain: listen, decode and submit.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> &ChainId;

    fn config(&self) -> &ChainConfig;

    /// Opens a fresh subscription for `filters`, starting strictly after
    /// `resume_from`, or from the chain head when no position is known.
    async fn listen(
        &self,
        filters: &[EventFilter],
        resume_from: Option<EventCursor>,
    ) -> Result<EventStream, Error>;

    /// `Ok(None)` marks an event that matched a topic but is not relevant.
    fn decode(&self, event: &RawEvent) -> Result<Option<Message>, DecodeError>;

    async fn submit(&self, message: &Message) -> Result<SubmitReceipt, SubmitError>;
}

/// Builds adapters from chain configuration.
#[async_trait]
pub trait ChainAdapterFactory: Send + Sync {
    async fn create_adapter(&self, config: &ChainConfig) -> Result<Arc<dyn ChainAdapter>, Error>;
}

pub struct DefaultChainAdapterFactory {
    signer: Arc<dyn MessageSigner>,
    poll_interval: std::time::Duration,
    submit_timeout: std::time::Duration,
}

impl DefaultChainAdapterFactory {
    pub fn new(
        signer: Arc<dyn MessageSigner>,
        poll_interval: std::time::Duration,
        submit_timeout: std::time::Duration,
    ) -> Self {
        Self {
            signer,
            poll_interval,
            submit_timeout,
        }
    }
}

#[async_trait]
impl ChainAdapterFactory for DefaultChainAdapterFactory {
    async fn create_adapter(&self, config: &ChainConfig) -> Result<Arc<dyn ChainAdapter>, Error> {
        match config.adapter_type.as_str() {
            "jsonrpc" => {
                let adapter = JsonRpcAdapter::new(
                    config.clone(),
                    Arc::clone(&self.signer),
                    self.poll_interval,
                    self.submit_timeout,
                )?;
                Ok(Arc::new(adapter))
            }
            _ => Err(Error::Chain(format!("Unsupported adapter type: {}", config.adapter_type))),
        }
    }
}

pub mod jsonrpc;

pub use jsonrpc::JsonRpcAdapter;
