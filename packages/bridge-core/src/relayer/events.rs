use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::types::Message;

/// Operator-visible outcome of the relayer's work.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayerEvent {
    Delivered {
        message: Message,
        attempts: u32,
        tx_hash: Option<String>,
    },
    Rejected {
        message: Message,
        reason: String,
    },
    DeliveryExhausted {
        message: Message,
        attempts: u32,
        last_error: String,
    },
    Unroutable {
        message: Message,
    },
    /// Shutdown overtook the work. `message` is `None` when a whole worker
    /// had to be aborted.
    Interrupted {
        worker: String,
        message: Option<Message>,
    },
}

impl RelayerEvent {
    pub fn message(&self) -> Option<&Message> {
        match self {
            RelayerEvent::Delivered { message, .. }
            | RelayerEvent::Rejected { message, .. }
            | RelayerEvent::DeliveryExhausted { message, .. }
            | RelayerEvent::Unroutable { message } => Some(message),
            RelayerEvent::Interrupted { message, .. } => message.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayerEvent::Delivered { .. })
    }
}

/// Injected sink for [`RelayerEvent`]s.
///
/// Every event is logged before it is forwarded, so a consumer that went
/// away never turns a terminal failure into a silent one.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RelayerEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RelayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: RelayerEvent) {
        match &event {
            RelayerEvent::Delivered { message, attempts, tx_hash } => {
                info!(id = %message.id(), destination = %message.destination_chain(), attempts, tx_hash = ?tx_hash, "message delivered");
            }
            RelayerEvent::Rejected { message, reason } => {
                error!(id = %message.id(), destination = %message.destination_chain(), "message rejected: {}", reason);
            }
            RelayerEvent::DeliveryExhausted { message, attempts, last_error } => {
                error!(id = %message.id(), destination = %message.destination_chain(), attempts, "delivery exhausted: {}", last_error);
            }
            RelayerEvent::Unroutable { message } => {
                error!(id = %message.id(), destination = %message.destination_chain(), "no adapter registered for destination");
            }
            RelayerEvent::Interrupted { worker, message } => {
                warn!(worker = %worker, id = ?message.as_ref().map(Message::id), "interrupted by shutdown");
            }
        }

        if self.tx.send(event).is_err() {
            warn!("operator event receiver dropped");
        }
    }
}
