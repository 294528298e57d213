use async_trait::async_trait;
use futures::StreamExt;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChainAdapter, DecodeError, EventStream, SubmitError, SubmitReceipt};
use crate::{
    config::{ChainConfig, EventFilter},
    signer::{sign_message, MessageSigner},
    types::{ChainId, EventCursor, Message, RawEvent},
    Error,
};

const EVENT_PAGE_LIMIT: u32 = 100;

/// RPC error codes meaning the chain will never accept the payload:
/// invalid params, execution reverted, transaction rejected.
const REJECTED_RPC_CODES: &[i64] = &[-32602, 3, -32003];

/// Adapter for bridge contracts exposed through a JSON-RPC endpoint.
pub struct JsonRpcAdapter {
    config: ChainConfig,
    client: reqwest::Client,
    signer: Arc<dyn MessageSigner>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEvent {
    height: u64,
    index: u32,
    topic: String,
    data: String,
}

#[derive(Debug)]
enum RpcFailure {
    Transport(String),
    Http(reqwest::StatusCode, String),
    Rpc { code: i64, message: String },
    Malformed(String),
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcFailure::Transport(e) => write!(f, "transport error: {}", e),
            RpcFailure::Http(status, body) => write!(f, "http {}: {}", status, body),
            RpcFailure::Rpc { code, message } => write!(f, "rpc error {}: {}", code, message),
            RpcFailure::Malformed(e) => write!(f, "malformed response: {}", e),
        }
    }
}

impl From<RpcFailure> for SubmitError {
    fn from(failure: RpcFailure) -> Self {
        let reason = failure.to_string();
        match failure {
            RpcFailure::Http(status, _)
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS =>
            {
                SubmitError::Transient(reason)
            }
            RpcFailure::Http(..) => SubmitError::Rejected(reason),
            RpcFailure::Rpc { code, .. } if REJECTED_RPC_CODES.contains(&code) => {
                SubmitError::Rejected(reason)
            }
            _ => SubmitError::Transient(reason),
        }
    }
}

async fn call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<T, RpcFailure> {
    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": [params],
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| RpcFailure::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RpcFailure::Http(status, body));
    }

    let body: RpcResponse<T> = response
        .json()
        .await
        .map_err(|e| RpcFailure::Malformed(e.to_string()))?;

    if let Some(error) = body.error {
        return Err(RpcFailure::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    body.result
        .ok_or_else(|| RpcFailure::Malformed("response carries neither result nor error".to_string()))
}

/// Polling subscription state. Owned by the stream it drives and dropped
/// wholesale when the listener reconnects.
struct Subscription {
    client: reqwest::Client,
    url: String,
    chain_id: ChainId,
    emitter: String,
    topics: Vec<String>,
    after: Option<EventCursor>,
    buffered: VecDeque<RawEvent>,
    poll_interval: Duration,
    failed: bool,
}

impl Subscription {
    async fn fetch(&mut self) -> Result<(), Error> {
        let events: Vec<RpcEvent> = call(
            &self.client,
            &self.url,
            "bridge_getEvents",
            json!({
                "emitter": self.emitter,
                "topics": self.topics,
                "after": self.after,
                "limit": EVENT_PAGE_LIMIT,
            }),
        )
        .await
        .map_err(|e| Error::Network(format!("{}: {}", self.chain_id, e)))?;

        for event in events {
            let cursor = EventCursor::new(event.height, event.index);
            if self.after.map_or(false, |after| cursor <= after) {
                continue;
            }
            // malformed hex becomes an empty payload, which no envelope decodes from
            let data = match hex::decode(event.data.trim_start_matches("0x")) {
                Ok(data) => data,
                Err(e) => {
                    warn!(chain = %self.chain_id, cursor = %cursor, "event data is not valid hex: {}", e);
                    Vec::new()
                }
            };
            self.after = Some(cursor);
            self.buffered.push_back(RawEvent {
                chain_id: self.chain_id.clone(),
                cursor,
                topic: event.topic,
                data,
            });
        }
        Ok(())
    }
}

impl JsonRpcAdapter {
    pub fn new(
        config: ChainConfig,
        signer: Arc<dyn MessageSigner>,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            signer,
            poll_interval,
        })
    }
}

#[async_trait]
impl ChainAdapter for JsonRpcAdapter {
    fn chain_id(&self) -> &ChainId {
        &self.config.id
    }

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn listen(
        &self,
        filters: &[EventFilter],
        resume_from: Option<EventCursor>,
    ) -> Result<EventStream, Error> {
        let mut subscription = Subscription {
            client: self.client.clone(),
            url: self.config.rpc_url.clone(),
            chain_id: self.config.id.clone(),
            emitter: self.config.emitter.clone(),
            topics: filters.iter().map(|f| f.topic.clone()).collect(),
            after: resume_from,
            buffered: VecDeque::new(),
            poll_interval: self.poll_interval,
            failed: false,
        };
        // the first page doubles as a connectivity check
        subscription.fetch().await?;
        debug!(chain = %self.config.id, after = ?resume_from, "subscription established");

        let stream = futures::stream::unfold(subscription, |mut sub| async move {
            loop {
                if sub.failed {
                    return None;
                }
                if let Some(event) = sub.buffered.pop_front() {
                    return Some((Ok(event), sub));
                }
                tokio::time::sleep(sub.poll_interval).await;
                if let Err(e) = sub.fetch().await {
                    sub.failed = true;
                    return Some((Err(e), sub));
                }
            }
        });

        Ok(stream.boxed())
    }

    fn decode(&self, event: &RawEvent) -> Result<Option<Message>, DecodeError> {
        if &event.chain_id != self.chain_id() {
            return Err(DecodeError::new(format!(
                "event from {} delivered to adapter for {}",
                event.chain_id,
                self.chain_id()
            )));
        }
        if !self.config.subscriptions.iter().any(|f| f.topic == event.topic) {
            return Ok(None);
        }

        let message = Message::decode(&event.data)?;
        if message.source_chain() != self.chain_id() {
            return Err(DecodeError::new(format!(
                "envelope claims source {} but was emitted on {}",
                message.source_chain(),
                self.chain_id()
            )));
        }
        Ok(Some(message))
    }

    async fn submit(&self, message: &Message) -> Result<SubmitReceipt, SubmitError> {
        let encoded = message
            .encode()
            .map_err(|e| SubmitError::Rejected(e.to_string()))?;
        let signature = sign_message(self.signer.as_ref(), message)
            .map_err(|e| SubmitError::Rejected(e.to_string()))?;

        let result: Value = call(
            &self.client,
            &self.config.rpc_url,
            "bridge_submitMessage",
            json!({
                "receiver": self.config.receiver,
                "message": hex::encode(&encoded),
                "signature": hex::encode(&signature),
                "signer": hex::encode(self.signer.public_key()),
            }),
        )
        .await
        .map_err(|failure| {
            let error = SubmitError::from(failure);
            warn!(chain = %self.config.id, id = %message.id(), "submission failed: {}", error);
            error
        })?;

        let tx_hash = result
            .get("tx_hash")
            .and_then(Value::as_str)
            .or_else(|| result.as_str())
            .map(str::to_string);

        Ok(SubmitReceipt { tx_hash })
    }
}
