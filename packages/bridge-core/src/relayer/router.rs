use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use super::{
    events::{EventSink, RelayerEvent},
    listener::ListenerWorker,
    registry::AdapterRegistry,
    retry::{Backoff, RetryPolicy},
    shutdown::{ShutdownController, ShutdownPhase, ShutdownSignal},
    submitter::SubmissionWorker,
};
use crate::{
    chain_adapter::ChainAdapter,
    config::RelayerConfig,
    types::{ChainId, Message},
    Error,
};

/// How long halted workers get to report their abandoned messages before
/// they are aborted outright.
const HALT_GRACE: Duration = Duration::from_secs(1);

/// Routing path shared by all listeners: resolves a message's destination
/// and enqueues it on that destination's lane for the message's source.
pub(crate) struct Dispatcher {
    registry: Arc<AdapterRegistry>,
    /// destination -> source -> lane sender
    lanes: HashMap<ChainId, HashMap<ChainId, mpsc::Sender<Message>>>,
    events: EventSink,
}

impl Dispatcher {
    /// Blocks while the destination lane is full; only a halted shutdown
    /// abandons the message.
    pub(crate) async fn route(
        &self,
        message: Message,
        shutdown: &mut ShutdownSignal,
    ) -> Result<(), Error> {
        let destination = message.destination_chain().clone();
        let lane = self
            .lanes
            .get(&destination)
            .filter(|_| self.registry.contains(&destination))
            .and_then(|by_source| by_source.get(message.source_chain()));

        let Some(lane) = lane else {
            let id = message.id();
            self.events.emit(RelayerEvent::Unroutable { message });
            return Err(Error::UnroutableMessage { id, destination });
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown.halted() => None,
            permit = lane.reserve() => permit.ok(),
        };

        match permit {
            Some(permit) => {
                permit.send(message);
                Ok(())
            }
            None => {
                let id = message.id();
                self.events.emit(RelayerEvent::Interrupted {
                    worker: format!("route:{}", message.source_chain()),
                    message: Some(message),
                });
                Err(Error::Interrupted(id))
            }
        }
    }
}

struct WorkerTask {
    name: String,
    handle: JoinHandle<()>,
    finished: bool,
}

struct Running {
    controller: ShutdownController,
    dispatcher: Arc<Dispatcher>,
    listeners: Vec<WorkerTask>,
    submitters: Vec<WorkerTask>,
}

enum RouterState {
    Idle,
    Running(Running),
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All workers exited before the shutdown deadline.
    pub graceful: bool,
    /// Workers that had to be aborted after the halt grace period.
    pub aborted: Vec<String>,
}

/// Owns the adapter registry and moves messages from every chain's listener
/// to the destination chain's submission worker.
pub struct Router {
    config: RelayerConfig,
    events: EventSink,
    registry: AdapterRegistry,
    state: RouterState,
}

impl Router {
    pub fn new(config: RelayerConfig, events: EventSink) -> Self {
        Self {
            config,
            events,
            registry: AdapterRegistry::new(),
            state: RouterState::Idle,
        }
    }

    pub fn add_chain(&mut self, adapter: Arc<dyn ChainAdapter>) -> Result<(), Error> {
        if !matches!(self.state, RouterState::Idle) {
            return Err(Error::AlreadyStarted);
        }
        info!(chain = %adapter.chain_id(), name = %adapter.config().name, "registering chain");
        self.registry.insert(adapter)
    }

    /// Spawns one listener and one submission worker per registered chain.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), Error> {
        if !matches!(self.state, RouterState::Idle) {
            return Err(Error::AlreadyStarted);
        }

        let registry = Arc::new(self.registry.clone());
        let (controller, _) = ShutdownController::new();
        let policy = RetryPolicy::from_config(&self.config);

        let mut lanes: HashMap<ChainId, HashMap<ChainId, mpsc::Sender<Message>>> = HashMap::new();
        let mut workers = Vec::with_capacity(registry.len());
        for (destination, adapter) in registry.iter() {
            let mut worker = SubmissionWorker::new(
                Arc::clone(adapter),
                policy.clone(),
                self.config.submit_timeout(),
                self.events.clone(),
            );
            let by_source = lanes.entry(destination.clone()).or_default();
            for source in registry.chain_ids() {
                let (tx, rx) = mpsc::channel(self.config.queue_capacity);
                by_source.insert(source.clone(), tx);
                worker.add_lane(source.clone(), rx);
            }
            workers.push((destination.clone(), worker));
        }

        let dispatcher = Arc::new(Dispatcher {
            registry: Arc::clone(&registry),
            lanes,
            events: self.events.clone(),
        });

        let submitters = workers
            .into_iter()
            .map(|(chain_id, worker)| WorkerTask {
                name: format!("submit:{}", chain_id),
                handle: tokio::spawn(worker.run(controller.subscribe())),
                finished: false,
            })
            .collect();

        let reconnect = Backoff::new(
            Duration::from_millis(self.config.reconnect_base_delay_ms),
            Duration::from_millis(self.config.reconnect_max_delay_ms),
            self.config.retry_jitter,
        );
        let listeners = registry
            .iter()
            .map(|(chain_id, adapter)| {
                let worker = ListenerWorker::new(
                    Arc::clone(adapter),
                    Arc::clone(&dispatcher),
                    reconnect.clone(),
                    self.config.connect_timeout(),
                );
                WorkerTask {
                    name: format!("listen:{}", chain_id),
                    handle: tokio::spawn(worker.run(controller.subscribe())),
                    finished: false,
                }
            })
            .collect();

        info!(chains = registry.len(), "router started");
        self.state = RouterState::Running(Running {
            controller,
            dispatcher,
            listeners,
            submitters,
        });
        Ok(())
    }

    /// Routes a message that did not come from a registered listener.
    pub async fn route(&self, message: Message) -> Result<(), Error> {
        let RouterState::Running(running) = &self.state else {
            return Err(Error::NotStarted);
        };
        let mut shutdown = running.controller.subscribe();
        running.dispatcher.route(message, &mut shutdown).await
    }

    /// Drains all workers, forcing the issue once the shutdown deadline has
    /// passed. Unfinished work is reported as `Interrupted`.
    pub async fn stop(&mut self) -> Result<ShutdownReport, Error> {
        let running = match mem::replace(&mut self.state, RouterState::Stopped) {
            RouterState::Running(running) => running,
            other => {
                self.state = other;
                return Err(Error::NotStarted);
            }
        };
        let Running {
            controller,
            dispatcher,
            listeners,
            submitters,
        } = running;

        info!("stopping router");
        controller.advance(ShutdownPhase::Draining);
        // lanes close once the listeners holding the remaining clones exit
        drop(dispatcher);

        let deadline = Instant::now() + self.config.shutdown_deadline();
        let mut tasks: Vec<WorkerTask> = listeners.into_iter().chain(submitters).collect();
        let mut graceful = true;
        for task in tasks.iter_mut() {
            match timeout_at(deadline, &mut task.handle).await {
                Ok(_) => task.finished = true,
                Err(_) => {
                    graceful = false;
                    break;
                }
            }
        }

        let mut aborted = Vec::new();
        if !graceful {
            warn!("shutdown deadline elapsed, halting remaining workers");
            controller.advance(ShutdownPhase::Halted);
            let grace = Instant::now() + HALT_GRACE;
            for task in tasks.iter_mut().filter(|task| !task.finished) {
                if timeout_at(grace, &mut task.handle).await.is_err() {
                    task.handle.abort();
                    self.events.emit(RelayerEvent::Interrupted {
                        worker: task.name.clone(),
                        message: None,
                    });
                    aborted.push(task.name.clone());
                }
            }
        }

        info!(graceful, aborted = aborted.len(), "router stopped");
        Ok(ShutdownReport { graceful, aborted })
    }
}
