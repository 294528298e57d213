use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    events::{EventSink, RelayerEvent},
    retry::{FailureKind, RetryPolicy, RetryState},
    shutdown::{ShutdownPhase, ShutdownSignal},
};
use crate::{
    chain_adapter::{ChainAdapter, SubmitError},
    types::{ChainId, Message, MessageStatus},
};

struct InFlight {
    message: Message,
    retry: RetryState,
}

/// Ordered queue of messages from one source chain. Only the head is ever
/// attempted, so a retrying head holds back its own lane and nothing else.
struct Lane {
    source: ChainId,
    rx: mpsc::Receiver<Message>,
    head: Option<InFlight>,
    closed: bool,
}

enum Wake {
    /// `None` when a lane closed and the drain condition needs a re-check.
    Arrival(Option<(usize, Message)>),
    Timer,
    Halt,
}

pub(crate) struct SubmissionWorker {
    adapter: Arc<dyn ChainAdapter>,
    lanes: Vec<Lane>,
    policy: RetryPolicy,
    submit_timeout: Duration,
    events: EventSink,
    /// Lane polled first on the next arrival; rotates for fairness.
    next_lane: usize,
}

impl SubmissionWorker {
    pub(crate) fn new(
        adapter: Arc<dyn ChainAdapter>,
        policy: RetryPolicy,
        submit_timeout: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            adapter,
            lanes: Vec::new(),
            policy,
            submit_timeout,
            events,
            next_lane: 0,
        }
    }

    pub(crate) fn add_lane(&mut self, source: ChainId, rx: mpsc::Receiver<Message>) {
        self.lanes.push(Lane {
            source,
            rx,
            head: None,
            closed: false,
        });
    }

    fn worker_name(&self) -> String {
        format!("submit:{}", self.adapter.chain_id())
    }

    pub(crate) async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(chain = %self.adapter.chain_id(), lanes = self.lanes.len(), "submission worker started");

        loop {
            if shutdown.phase() == ShutdownPhase::Halted {
                self.interrupt_all();
                break;
            }

            if let Some(idx) = self.next_ready(Instant::now()) {
                if !self.attempt(idx, &mut shutdown).await {
                    self.interrupt_all();
                    break;
                }
                continue;
            }

            if self.is_drained() {
                break;
            }

            let wake_at = self.next_wake();
            let wake = {
                let lanes = &mut self.lanes;
                let start = self.next_lane;
                tokio::select! {
                    biased;
                    _ = shutdown.halted() => Wake::Halt,
                    arrival = next_arrival(lanes, start) => Wake::Arrival(arrival),
                    _ = sleep_until_opt(wake_at), if wake_at.is_some() => Wake::Timer,
                }
            };

            match wake {
                Wake::Arrival(Some((idx, message))) => {
                    debug!(chain = %self.adapter.chain_id(), id = %message.id(), "message queued for submission");
                    self.lanes[idx].head = Some(InFlight {
                        message,
                        retry: RetryState::new(Instant::now()),
                    });
                    self.next_lane = (idx + 1) % self.lanes.len().max(1);
                }
                Wake::Arrival(None) | Wake::Timer => {}
                Wake::Halt => {
                    self.interrupt_all();
                    break;
                }
            }
        }

        info!(chain = %self.adapter.chain_id(), "submission worker stopped");
    }

    fn next_ready(&self, now: Instant) -> Option<usize> {
        let count = self.lanes.len();
        (0..count)
            .map(|offset| (self.next_lane + offset) % count)
            .find(|&idx| {
                self.lanes[idx]
                    .head
                    .as_ref()
                    .map_or(false, |inflight| inflight.retry.is_ready(now))
            })
    }

    fn next_wake(&self) -> Option<Instant> {
        self.lanes
            .iter()
            .filter_map(|lane| lane.head.as_ref().map(|inflight| inflight.retry.next_attempt_at))
            .min()
    }

    fn is_drained(&self) -> bool {
        self.lanes.iter().all(|lane| lane.closed && lane.head.is_none())
    }

    /// Returns `false` when shutdown halted the attempt.
    async fn attempt(&mut self, idx: usize, shutdown: &mut ShutdownSignal) -> bool {
        let adapter = Arc::clone(&self.adapter);
        let submit_timeout = self.submit_timeout;
        let Some(inflight) = self.lanes[idx].head.as_mut() else {
            return true;
        };

        inflight.retry.attempts += 1;
        inflight.message.set_status(MessageStatus::InFlight);
        let attempts = inflight.retry.attempts;
        debug!(chain = %adapter.chain_id(), id = %inflight.message.id(), attempt = attempts, "submitting message");

        let outcome = {
            let message = &inflight.message;
            tokio::select! {
                biased;
                _ = shutdown.halted() => None,
                outcome = tokio::time::timeout(submit_timeout, adapter.submit(message)) => Some(outcome),
            }
        };

        let Some(outcome) = outcome else {
            return false;
        };

        let failure = match outcome {
            Ok(Ok(receipt)) => {
                self.finish(idx, MessageStatus::Delivered, |message| RelayerEvent::Delivered {
                    message,
                    attempts,
                    tx_hash: receipt.tx_hash,
                });
                return true;
            }
            Ok(Err(SubmitError::Rejected(reason))) => {
                self.finish(idx, MessageStatus::Failed, |message| RelayerEvent::Rejected {
                    message,
                    reason,
                });
                return true;
            }
            Ok(Err(SubmitError::Transient(reason))) => reason,
            Err(_) => format!("submit timed out after {:?}", submit_timeout),
        };

        match self.policy.next_delay(attempts, FailureKind::Transient) {
            Some(delay) => {
                if let Some(inflight) = self.lanes[idx].head.as_mut() {
                    warn!(
                        chain = %adapter.chain_id(),
                        id = %inflight.message.id(),
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts(),
                        delay = ?delay,
                        "transient submission failure: {}",
                        failure
                    );
                    inflight.retry.next_attempt_at = Instant::now() + delay;
                    inflight.retry.last_error = Some(failure);
                }
            }
            None => {
                self.finish(idx, MessageStatus::Failed, |message| RelayerEvent::DeliveryExhausted {
                    message,
                    attempts,
                    last_error: failure,
                });
            }
        }
        true
    }

    fn finish(
        &mut self,
        idx: usize,
        status: MessageStatus,
        event: impl FnOnce(Message) -> RelayerEvent,
    ) {
        if let Some(mut inflight) = self.lanes[idx].head.take() {
            inflight.message.set_status(status);
            self.events.emit(event(inflight.message));
        }
    }

    /// Reports every message this worker still holds as interrupted.
    fn interrupt_all(&mut self) {
        let worker = self.worker_name();
        for lane in self.lanes.iter_mut() {
            if let Some(mut inflight) = lane.head.take() {
                if let Some(last_error) = &inflight.retry.last_error {
                    debug!(
                        worker = %worker,
                        id = %inflight.message.id(),
                        attempts = inflight.retry.attempts,
                        "halting retried message, last error: {}",
                        last_error
                    );
                }
                inflight.message.set_status(MessageStatus::Failed);
                self.events.emit(RelayerEvent::Interrupted {
                    worker: worker.clone(),
                    message: Some(inflight.message),
                });
            }
            lane.rx.close();
            while let Ok(mut message) = lane.rx.try_recv() {
                message.set_status(MessageStatus::Failed);
                self.events.emit(RelayerEvent::Interrupted {
                    worker: worker.clone(),
                    message: Some(message),
                });
            }
            lane.closed = true;
            debug!(worker = %worker, source = %lane.source, "lane closed");
        }
    }
}

/// Next message from any lane whose head slot is free. Resolves to `None`
/// when a lane has just closed, and never resolves when no lane can accept
/// a message.
async fn next_arrival(lanes: &mut [Lane], start: usize) -> Option<(usize, Message)> {
    poll_fn(|cx| {
        let count = lanes.len();
        let mut closed_any = false;
        for offset in 0..count {
            let idx = (start + offset) % count;
            let lane = &mut lanes[idx];
            if lane.closed || lane.head.is_some() {
                continue;
            }
            match lane.rx.poll_recv(cx) {
                Poll::Ready(Some(message)) => return Poll::Ready(Some((idx, message))),
                Poll::Ready(None) => {
                    lane.closed = true;
                    closed_any = true;
                }
                Poll::Pending => {}
            }
        }
        if closed_any {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    })
    .await
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
