#![allow(dead_code)]

use async_trait::async_trait;
use bridge_core::{
    chain_adapter::{ChainAdapter, DecodeError, EventStream, SubmitError, SubmitReceipt},
    ChainConfig, ChainId, Error, EventCursor, EventFilter, Message, RawEvent, RelayerConfig,
    RelayerEvent,
};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

pub const NOISE_TOPIC: &str = "Noise()";

/// What one call to `listen` does.
pub enum Session {
    Refuse,
    /// Yield up to `take` pending events, then fail the connection.
    Drop { take: usize },
}

/// Scripted result of one `submit` call.
#[derive(Clone)]
pub enum Scripted {
    Ok,
    Transient,
    Rejected,
    Stall(Duration),
}

/// In-memory chain: a fixed event log to listen on and scripted submit
/// results keyed by message id.
pub struct ScriptedAdapter {
    config: ChainConfig,
    log: Mutex<Vec<RawEvent>>,
    sessions: Mutex<VecDeque<Session>>,
    outcomes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    submissions: Mutex<Vec<(String, Instant)>>,
    listens: Mutex<Vec<(Option<EventCursor>, Instant)>>,
    /// Blocks the worker thread inside `decode`, out of reach of any
    /// cooperative cancellation.
    decode_block: Mutex<Option<Duration>>,
}

impl ScriptedAdapter {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            config: ChainConfig {
                id: id.into(),
                adapter_type: "jsonrpc".to_string(),
                name: id.to_string(),
                rpc_url: format!("memory://{}", id),
                receiver: format!("{}-receiver", id),
                emitter: format!("{}-emitter", id),
                subscriptions: vec![EventFilter {
                    name: "bridge".to_string(),
                    topic: "Deposit(bytes)".to_string(),
                }],
            },
            log: Mutex::new(Vec::new()),
            sessions: Mutex::new(VecDeque::new()),
            outcomes: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            listens: Mutex::new(Vec::new()),
            decode_block: Mutex::new(None),
        })
    }

    fn push_raw(&self, topic: &str, data: Vec<u8>) {
        let mut log = self.log.lock().unwrap();
        let cursor = EventCursor::new(log.len() as u64 + 1, 0);
        log.push(RawEvent {
            chain_id: self.config.id.clone(),
            cursor,
            topic: topic.to_string(),
            data,
        });
    }

    /// Appends a bridge event carrying a message to `destination`.
    pub fn emit(&self, destination: &str, nonce: u64) {
        let message = Message::new(
            self.config.id.clone(),
            destination.into(),
            nonce,
            format!("payload-{}", nonce).into_bytes(),
        );
        self.push_raw("Deposit(bytes)", message.encode().unwrap());
    }

    pub fn emit_garbage(&self) {
        self.push_raw("Deposit(bytes)", b"garbage".to_vec());
    }

    pub fn emit_noise(&self) {
        self.push_raw(NOISE_TOPIC, Vec::new());
    }

    pub fn script(&self, message_id: &str, outcomes: Vec<Scripted>) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(message_id.to_string(), outcomes.into());
    }

    pub fn sessions(&self, sessions: Vec<Session>) {
        *self.sessions.lock().unwrap() = sessions.into();
    }

    pub fn submissions(&self) -> Vec<(String, Instant)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self, message_id: &str) -> usize {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == message_id)
            .count()
    }

    pub fn listens(&self) -> Vec<Option<EventCursor>> {
        self.listens.lock().unwrap().iter().map(|(from, _)| *from).collect()
    }

    /// Gaps between consecutive `listen` calls.
    pub fn listen_gaps(&self) -> Vec<Duration> {
        let listens = self.listens.lock().unwrap();
        listens.windows(2).map(|pair| pair[1].1 - pair[0].1).collect()
    }

    pub fn block_decode(&self, duration: Duration) {
        *self.decode_block.lock().unwrap() = Some(duration);
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn chain_id(&self) -> &ChainId {
        &self.config.id
    }

    fn config(&self) -> &ChainConfig {
        &self.config
    }

    async fn listen(
        &self,
        _filters: &[EventFilter],
        resume_from: Option<EventCursor>,
    ) -> Result<EventStream, Error> {
        self.listens.lock().unwrap().push((resume_from, Instant::now()));
        let session = self.sessions.lock().unwrap().pop_front();
        let pending: Vec<RawEvent> = self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|event| resume_from.map_or(true, |after| event.cursor > after))
            .cloned()
            .collect();

        match session {
            Some(Session::Refuse) => Err(Error::Network("connection refused".to_string())),
            Some(Session::Drop { take }) => {
                let items = pending
                    .into_iter()
                    .take(take)
                    .map(Ok)
                    .chain(std::iter::once(Err(Error::Network("connection reset".to_string()))));
                Ok(futures::stream::iter(items).boxed())
            }
            None => Ok(futures::stream::iter(pending.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }

    fn decode(&self, event: &RawEvent) -> Result<Option<Message>, DecodeError> {
        let block = *self.decode_block.lock().unwrap();
        if let Some(duration) = block {
            std::thread::sleep(duration);
        }
        if event.topic == NOISE_TOPIC {
            return Ok(None);
        }
        Message::decode(&event.data).map(Some)
    }

    async fn submit(&self, message: &Message) -> Result<SubmitReceipt, SubmitError> {
        let id = message.id();
        self.submissions.lock().unwrap().push((id.clone(), Instant::now()));
        let next = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front);

        match next.unwrap_or(Scripted::Ok) {
            Scripted::Ok => Ok(SubmitReceipt {
                tx_hash: Some(format!("0x{}", id)),
            }),
            Scripted::Transient => Err(SubmitError::Transient("nonce contention".to_string())),
            Scripted::Rejected => Err(SubmitError::Rejected("replayed payload".to_string())),
            Scripted::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(SubmitReceipt::default())
            }
        }
    }
}

pub fn fast_config() -> RelayerConfig {
    RelayerConfig {
        poll_interval_ms: 10,
        max_attempts: 5,
        retry_base_delay_ms: 20,
        retry_max_delay_ms: 200,
        retry_jitter: 0.0,
        queue_capacity: 8,
        shutdown_deadline_ms: 2_000,
        submit_timeout_ms: 1_000,
        connect_timeout_ms: 500,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 50,
    }
}

/// Waits for exactly `count` operator events, panicking after a generous
/// timeout.
pub async fn next_events(
    rx: &mut UnboundedReceiver<RelayerEvent>,
    count: usize,
) -> Vec<RelayerEvent> {
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            _ => panic!("expected {} events, got {:?}", count, events),
        }
    }
    events
}

pub fn ids(events: &[RelayerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event.message().map(Message::id))
        .collect()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
