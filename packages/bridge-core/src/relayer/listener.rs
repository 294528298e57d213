use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    retry::Backoff,
    router::Dispatcher,
    shutdown::ShutdownSignal,
};
use crate::{
    chain_adapter::{ChainAdapter, EventStream},
    types::{EventCursor, RawEvent},
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerState {
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}

enum Flow {
    Continue,
    Reconnect,
    Stop,
}

/// Consumes one adapter's event subscription and routes decoded messages.
///
/// Events are handled strictly in stream order, which is what gives
/// per-source FIFO downstream.
pub(crate) struct ListenerWorker {
    adapter: Arc<dyn ChainAdapter>,
    dispatcher: Arc<Dispatcher>,
    reconnect: Backoff,
    connect_timeout: Duration,
    state: ListenerState,
    /// Last event fully processed; subscriptions resume strictly after it.
    resume_from: Option<EventCursor>,
    last_nonce: Option<u64>,
}

impl ListenerWorker {
    pub(crate) fn new(
        adapter: Arc<dyn ChainAdapter>,
        dispatcher: Arc<Dispatcher>,
        reconnect: Backoff,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            dispatcher,
            reconnect,
            connect_timeout,
            state: ListenerState::Connecting,
            resume_from: None,
            last_nonce: None,
        }
    }

    fn transition(&mut self, state: ListenerState) {
        if self.state != state {
            debug!(chain = %self.adapter.chain_id(), from = ?self.state, to = ?state, "listener state change");
            self.state = state;
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: ShutdownSignal) {
        let adapter = Arc::clone(&self.adapter);
        let filters = adapter.config().subscriptions.clone();
        let mut failures: u32 = 0;
        info!(chain = %adapter.chain_id(), topics = filters.len(), "listener started");

        loop {
            self.transition(ListenerState::Connecting);
            let connect = tokio::time::timeout(
                self.connect_timeout,
                adapter.listen(&filters, self.resume_from),
            );
            let opened = tokio::select! {
                biased;
                _ = shutdown.draining() => break,
                opened = connect => opened,
            };

            match opened {
                Ok(Ok(stream)) => {
                    self.transition(ListenerState::Streaming);
                    let resumed_from = self.resume_from;
                    let flow = self.consume(stream, &mut shutdown).await;
                    // an accepted subscription only counts as healthy once it made progress
                    if self.resume_from != resumed_from {
                        failures = 0;
                    }
                    if let Flow::Stop = flow {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(chain = %adapter.chain_id(), "subscription failed: {}", e);
                }
                Err(_) => {
                    warn!(chain = %adapter.chain_id(), timeout = ?self.connect_timeout, "subscription timed out");
                }
            }

            self.transition(ListenerState::Reconnecting);
            failures = failures.saturating_add(1);
            let delay = self.reconnect.delay(failures);
            debug!(chain = %adapter.chain_id(), attempt = failures, delay = ?delay, "resubscribing after backoff");
            tokio::select! {
                biased;
                _ = shutdown.draining() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(ListenerState::Stopped);
        info!(chain = %adapter.chain_id(), resume_from = ?self.resume_from, "listener stopped");
    }

    async fn consume(&mut self, mut stream: EventStream, shutdown: &mut ShutdownSignal) -> Flow {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.draining() => return Flow::Stop,
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(chain = %self.adapter.chain_id(), "subscription error: {}", e);
                    return Flow::Reconnect;
                }
                None => {
                    warn!(chain = %self.adapter.chain_id(), "subscription closed");
                    return Flow::Reconnect;
                }
            };

            match self.handle(event, shutdown).await {
                Flow::Continue => {}
                flow => return flow,
            }
        }
    }

    async fn handle(&mut self, event: RawEvent, shutdown: &mut ShutdownSignal) -> Flow {
        let chain_id = self.adapter.chain_id().clone();
        let cursor = event.cursor;

        let decoded = self.adapter.decode(&event);
        match decoded {
            Ok(Some(message)) if message.source_chain() != &chain_id => {
                warn!(chain = %chain_id, cursor = %cursor, source = %message.source_chain(), "dropping message claiming a foreign source");
            }
            Ok(Some(message)) if self.last_nonce.map_or(false, |last| message.nonce() <= last) => {
                debug!(chain = %chain_id, nonce = message.nonce(), "skipping already routed nonce");
            }
            Ok(Some(message)) => {
                let nonce = message.nonce();
                if let Some(last) = self.last_nonce {
                    if nonce > last + 1 {
                        warn!(chain = %chain_id, last, nonce, "nonce gap in source events");
                    }
                }
                match self.dispatcher.route(message, shutdown).await {
                    Ok(()) => {}
                    Err(Error::Interrupted(_)) => return Flow::Stop,
                    Err(e) => warn!(chain = %chain_id, nonce, "{}", e),
                }
                self.last_nonce = Some(nonce);
            }
            Ok(None) => {
                debug!(chain = %chain_id, cursor = %cursor, topic = %event.topic, "ignoring irrelevant event");
            }
            Err(e) => {
                warn!(chain = %chain_id, cursor = %cursor, "dropping event: {}", e);
            }
        }

        self.resume_from = Some(cursor);
        Flow::Continue
    }
}
