//! Routing core: adapter registry, per-chain listener and submission
//! workers, and the retry policy they share.
//!
//! Every registered chain gets exactly two long-lived tasks. Listeners push
//! decoded messages through the [`Router`]'s dispatch path into bounded
//! per-(destination, source) lanes; each destination's submission worker
//! drains its lanes head-first, so a retrying message only holds back
//! messages from the same source.

pub mod events;
mod listener;
pub mod registry;
pub mod retry;
pub mod router;
pub mod shutdown;
mod submitter;

pub use events::{EventSink, RelayerEvent};
pub use registry::AdapterRegistry;
pub use retry::{Backoff, FailureKind, RetryPolicy, RetryState};
pub use router::{Router, ShutdownReport};
pub use shutdown::{ShutdownController, ShutdownPhase, ShutdownSignal};
