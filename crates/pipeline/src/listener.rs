//! Endpoint Listener - One endpoint, one transport, one action chain
//!
//! ```text
//!              [supervisor task]                    [dispatch task]
//! Transport::start ──TransportEvent──> mpsc ──> ActionChain::dispatch
//!        ^  restart with backoff
//! ```
//!
//! The listener owns both tasks. Events of one connection arrive in order
//! and are dispatched one at a time, so every action sees them in the
//! order they were received.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use atna_actions::{ActionChain, ActionContext, ActionDeps, ActionRegistry};
use atna_protocol::TransportEvent;
use atna_transport::{EndpointConfig, Transport, TransportMetricsSnapshot, TransportRegistry};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::metrics::{ListenerMetrics, ListenerMetricsSnapshot};
use crate::supervisor::{RestartPolicy, SupervisorExit, supervise};
use crate::DEFAULT_CHANNEL_SIZE;

#[cfg(test)]
#[path = "listener_test.rs"]
mod tests;

/// Lifecycle of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Transport and actions built, nothing running
    Created,
    Running,
    /// Stopped on request or after a clean transport exit
    Stopped,
    /// Restart policy exhausted
    Failed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Receives on one endpoint and runs its actions
pub struct EndpointListener {
    config: Arc<EndpointConfig>,
    transport: Arc<dyn Transport>,
    chain: Arc<ActionChain>,
    ctx: ActionContext,
    policy: RestartPolicy,
    channel_size: usize,
    state: Arc<Mutex<ListenerState>>,
    metrics: Arc<ListenerMetrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EndpointListener {
    /// Build the transport and action chain for `config`
    ///
    /// # Errors
    /// Fails if the scheme is unknown, the transport rejects the
    /// configuration, or an action type is unknown or misconfigured.
    pub fn new(
        config: EndpointConfig,
        registry: Arc<TransportRegistry>,
        actions: &ActionRegistry,
        deps: &ActionDeps,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let transport = registry
            .create(config.scheme(), Arc::clone(&config))
            .map_err(|e| PipelineError::transport(&config.name, e))?;
        let chain = actions
            .build_chain(&config, deps)
            .map_err(|e| PipelineError::action(&config.name, e))?;

        Ok(Self::from_parts(config, transport, chain, registry))
    }

    /// Assemble a listener from already built parts
    pub fn from_parts(
        config: Arc<EndpointConfig>,
        transport: Arc<dyn Transport>,
        chain: ActionChain,
        registry: Arc<TransportRegistry>,
    ) -> Self {
        let ctx = ActionContext::new(config.name.as_str(), registry);
        Self {
            config,
            transport,
            chain: Arc::new(chain),
            ctx,
            policy: RestartPolicy::default(),
            channel_size: DEFAULT_CHANNEL_SIZE,
            state: Arc::new(Mutex::new(ListenerState::Created)),
            metrics: Arc::new(ListenerMetrics::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Capacity of the transport-to-dispatch channel
    #[must_use]
    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size.max(1);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Action names in dispatch order
    pub fn actions(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    /// Bound address once the transport is listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn metrics(&self) -> ListenerMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn transport_metrics(&self) -> TransportMetricsSnapshot {
        self.transport.metrics()
    }

    /// Spawn the supervisor and dispatch tasks
    ///
    /// # Errors
    /// Fails unless the listener is `Created`, or outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime =
            Handle::try_current().map_err(|_| PipelineError::NoRuntime(self.config.name.clone()))?;

        {
            let mut state = self.state.lock();
            if *state != ListenerState::Created {
                return Err(PipelineError::InvalidState {
                    endpoint: self.config.name.clone(),
                    state: *state,
                });
            }
            *state = ListenerState::Running;
        }

        let (tx, rx) = mpsc::channel(self.channel_size);

        let supervisor = runtime.spawn(run_supervisor(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            tx,
            self.policy,
            Arc::clone(&self.metrics),
            Arc::clone(&self.state),
            self.cancel.clone(),
        ));

        let dispatcher = runtime.spawn(run_dispatch(
            Arc::clone(&self.chain),
            self.ctx.clone(),
            rx,
            Arc::clone(&self.metrics),
            self.cancel.clone(),
        ));

        self.tasks.lock().extend([supervisor, dispatcher]);

        tracing::info!(
            endpoint = %self.config.name,
            address = %self.config.address,
            actions = ?self.chain.names(),
            "endpoint listener started"
        );
        Ok(())
    }

    /// Stop the transport and the dispatch loop
    ///
    /// Events already queued are still dispatched. Calling `stop` more than
    /// once is harmless.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ListenerState::Created | ListenerState::Running) {
                *state = ListenerState::Stopped;
            }
        }

        if !self.cancel.is_cancelled() {
            tracing::info!(endpoint = %self.config.name, "stopping endpoint listener");
        }
        self.cancel.cancel();
        self.transport.stop();
    }

    /// Wait for both tasks to finish
    pub async fn wait(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(endpoint = %self.config.name, error = %e, "listener task failed");
            }
        }
    }
}

impl Drop for EndpointListener {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.transport.stop();
    }
}

async fn run_supervisor(
    config: Arc<EndpointConfig>,
    transport: Arc<dyn Transport>,
    events: mpsc::Sender<TransportEvent>,
    policy: RestartPolicy,
    metrics: Arc<ListenerMetrics>,
    state: Arc<Mutex<ListenerState>>,
    cancel: CancellationToken,
) {
    let exit = supervise(&config.name, transport, events, policy, metrics, cancel.clone()).await;

    {
        let mut state = state.lock();
        if *state == ListenerState::Running {
            *state = match exit {
                SupervisorExit::Stopped => ListenerState::Stopped,
                SupervisorExit::Failed(_) => ListenerState::Failed,
            };
        }
    }

    // Nothing will feed the dispatch loop any more
    cancel.cancel();
}

async fn run_dispatch(
    chain: Arc<ActionChain>,
    ctx: ActionContext,
    mut events: mpsc::Receiver<TransportEvent>,
    metrics: Arc<ListenerMetrics>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(&chain, &ctx, &metrics, &event).await;
    }

    // Drain what was queued before the stop
    events.close();
    while let Ok(event) = events.try_recv() {
        dispatch(&chain, &ctx, &metrics, &event).await;
    }

    tracing::debug!(endpoint = %ctx.endpoint, "dispatch loop exited");
}

async fn dispatch(
    chain: &ActionChain,
    ctx: &ActionContext,
    metrics: &ListenerMetrics,
    event: &TransportEvent,
) {
    tracing::trace!(
        endpoint = %ctx.endpoint,
        event = event.kind(),
        peer = %event.solicitor(),
        "dispatching"
    );
    let report = chain.dispatch(ctx, event).await;
    metrics.record_dispatch(report.failures.len() as u64);
}
