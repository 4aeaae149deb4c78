//! ATNA Pipeline - Endpoint listeners
//!
//! Connects one transport to one ordered action chain.
//!
//! # Architecture
//!
//! ```text
//! [Transport] ──TransportEvent──> mpsc::Receiver ──> [ActionChain]
//!      ^                                               log ─> store ─> forward
//! [Supervisor] restart with backoff
//! ```
//!
//! # Key Design
//!
//! - **Channel handoff**: transports never call actions; the dispatch loop
//!   runs the chain for one event at a time
//! - **Failure isolation**: a failing or panicking action is counted, the
//!   chain and the listener keep going
//! - **Supervision**: a transport that fails to start is restarted with
//!   exponential backoff until the restart policy gives up
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(TransportRegistry::with_builtin(ForwardOptions::default())?);
//! let listener = EndpointListener::new(
//!     config,
//!     registry,
//!     &ActionRegistry::with_builtin(),
//!     &ActionDeps::default(),
//! )?;
//!
//! listener.start()?;
//! // ...
//! listener.stop();
//! listener.wait().await;
//! ```

mod error;
mod listener;
mod metrics;
mod supervisor;

pub use error::{PipelineError, Result};
pub use listener::{EndpointListener, ListenerState};
pub use metrics::{ListenerMetrics, ListenerMetricsSnapshot};
pub use supervisor::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RESTARTS, RestartPolicy,
    SupervisorExit,
};

/// Default capacity of the transport-to-dispatch channel
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;
