use std::sync::Arc;
use std::time::Duration;

use surface_bridge::{EndpointId, SurfaceBridge};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::SessionError;
use crate::events;
use crate::interceptor::{ExecutionHost, ExecutionInterceptor};
use crate::pending::PendingResultTable;
use crate::proxy::ViewerProxy;
use crate::queue::CommandQueue;
use crate::registry::{EndpointPhase, EndpointRegistry};
use crate::worker::{dispatch_endpoint, flush_endpoint, DispatchWorker};

/// Session-level knobs. Both timeouts default to `None`: an endpoint
/// that never becomes ready stalls its queues indefinitely, matching
/// the behavior callers historically relied on. With a timeout set,
/// a stalled endpoint's queued reads fail with `EndpointTimeout` and
/// its queued writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub ready_timeout: Option<Duration>,
    pub data_ready_timeout: Option<Duration>,
}

/// Owns everything one hosting session shares: the endpoint registry,
/// the pending-result table, the dispatch worker, and (when a host is
/// attached) the execution interceptor. Explicit injection instead of
/// process-wide singletons; drop the session and the whole apparatus
/// goes with it.
pub struct ViewerSession {
    bridge: Arc<dyn SurfaceBridge>,
    registry: Arc<EndpointRegistry>,
    pending: Arc<PendingResultTable>,
    interceptor: Option<Arc<ExecutionInterceptor>>,
    worker: DispatchWorker,
    config: SessionConfig,
}

impl ViewerSession {
    /// Session without an execution interceptor, for environments where
    /// units of work do not need deferral.
    pub fn new(bridge: Arc<dyn SurfaceBridge>) -> Result<Self, SessionError> {
        Self::build(bridge, SessionConfig::default(), None)
    }

    pub fn with_config(
        bridge: Arc<dyn SurfaceBridge>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        Self::build(bridge, config, None)
    }

    /// Session that intercepts the host's unit-of-work hook: captured
    /// units are replayed through `host` once every endpoint is ready
    /// and every pending read has resolved.
    pub fn with_host(
        bridge: Arc<dyn SurfaceBridge>,
        config: SessionConfig,
        host: Arc<dyn ExecutionHost>,
    ) -> Result<Self, SessionError> {
        Self::build(bridge, config, Some(host))
    }

    fn build(
        bridge: Arc<dyn SurfaceBridge>,
        config: SessionConfig,
        host: Option<Arc<dyn ExecutionHost>>,
    ) -> Result<Self, SessionError> {
        let (events_tx, events_rx) = events::channel();
        let registry = Arc::new(EndpointRegistry::new(events_tx.clone()));
        let pending = Arc::new(PendingResultTable::new(events_tx.clone()));
        let worker = DispatchWorker::spawn()?;

        let interceptor = match host {
            Some(host) => {
                let interceptor = Arc::new(ExecutionInterceptor::new(
                    registry.clone(),
                    pending.clone(),
                    host,
                    events_tx,
                ));
                worker.spawn_task(interceptor.clone().run(events_rx, worker.shutdown_watch()));
                Some(interceptor)
            }
            None => None,
        };

        Ok(Self {
            bridge,
            registry,
            pending,
            interceptor,
            worker,
            config,
        })
    }

    /// Registers a new endpoint under `name` and returns its proxy.
    /// The endpoint is registered before the proxy exists, so readiness
    /// signals can never race with registration.
    pub fn create_viewer(&self, name: impl Into<EndpointId>) -> ViewerProxy {
        let endpoint: EndpointId = name.into();
        let phase_rx = self.registry.register(&endpoint);
        let queue = Arc::new(CommandQueue::new());
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        self.worker.spawn_task(flush_endpoint(
            endpoint.clone(),
            queue.clone(),
            self.pending.clone(),
            phase_rx,
            dispatch_tx.clone(),
            self.config.ready_timeout,
            self.config.data_ready_timeout,
            self.worker.shutdown_watch(),
        ));
        self.worker.spawn_task(dispatch_endpoint(
            endpoint.clone(),
            self.bridge.clone(),
            self.pending.clone(),
            dispatch_rx,
            self.worker.shutdown_watch(),
        ));

        info!(endpoint = %endpoint, "viewer created");
        ViewerProxy::new(endpoint, queue, dispatch_tx, self.pending.clone())
    }

    /// Entry point for the bridge's "surface object exists" event.
    pub fn surface_ready(&self, endpoint: &EndpointId) {
        self.registry.advance(endpoint, EndpointPhase::SurfaceReady);
    }

    /// Entry point for the bridge's "first payload rendered" event.
    pub fn data_ready(&self, endpoint: &EndpointId) {
        self.registry.advance(endpoint, EndpointPhase::DataReady);
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn pending_reads(&self) -> &PendingResultTable {
        &self.pending
    }

    pub fn interceptor(&self) -> Option<&Arc<ExecutionInterceptor>> {
        self.interceptor.as_ref()
    }

    /// Signals the dispatch worker and joins its thread. In-flight
    /// bridge calls get a bounded grace period to settle.
    pub fn shutdown(mut self) {
        self.worker.shutdown();
    }
}
