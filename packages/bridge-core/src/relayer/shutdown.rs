use tokio::sync::watch;

/// Shutdown progresses monotonically through these phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    /// Stop observing new events; finish what is already queued.
    Draining,
    /// The shutdown deadline passed; abandon unfinished work.
    Halted,
}

pub struct ShutdownController {
    tx: watch::Sender<ShutdownPhase>,
}

impl ShutdownController {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(ShutdownPhase::Running);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn advance(&self, phase: ShutdownPhase) {
        self.tx.send_if_modified(|current| {
            if phase > *current {
                *current = phase;
                true
            } else {
                false
            }
        });
    }
}

/// Cooperative cancellation handle threaded through every worker.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownSignal {
    pub fn phase(&self) -> ShutdownPhase {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has reached at least `phase`. A dropped
    /// controller counts as halted.
    pub async fn reached(&mut self, phase: ShutdownPhase) {
        loop {
            if *self.rx.borrow_and_update() >= phase {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn draining(&mut self) {
        self.reached(ShutdownPhase::Draining).await
    }

    pub async fn halted(&mut self) {
        self.reached(ShutdownPhase::Halted).await
    }
}
