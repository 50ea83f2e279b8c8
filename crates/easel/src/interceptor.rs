use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::events::{EventReceiver, EventSender, SchedulerEvent};
use crate::pending::PendingResultTable;
use crate::registry::EndpointRegistry;
use crate::worker::shutdown_flagged;

/// Where a unit's reply goes: stream name, caller identity, and the
/// parent message envelope. Carried through replay and abort untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRouting {
    pub stream: String,
    pub identity: String,
    pub parent: Value,
}

/// One discrete, host-scheduled piece of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub id: String,
    pub payload: Value,
    pub routing: ResponseRouting,
}

/// The host's execution hooks. `execute` re-invokes the original
/// "run next unit" entry point with the unit's routing metadata;
/// `abort` routes the unit's reply as aborted without executing it;
/// `flush_io` flushes stdout/stderr buffers belonging to the unit.
///
/// Implementations are responsible for marshaling onto the host's own
/// scheduling context; the interceptor calls these from the dispatch
/// worker's loop.
pub trait ExecutionHost: Send + Sync {
    fn execute(&self, unit: &ExecutionUnit) -> Result<(), HostError>;
    fn abort(&self, unit: &ExecutionUnit);
    fn flush_io(&self, unit: &ExecutionUnit);
}

/// Captures incoming execution units and replays them through the host
/// hook once every known endpoint is surface-ready and every pending
/// read has resolved.
///
/// Replay order is capture order. After a unit fails during replay,
/// subsequently drained units are routed through the abort path until
/// the capture queue empties or [`clear_abort`] is called.
///
/// [`clear_abort`]: ExecutionInterceptor::clear_abort
pub struct ExecutionInterceptor {
    registry: Arc<EndpointRegistry>,
    pending: Arc<PendingResultTable>,
    host: Arc<dyn ExecutionHost>,
    captured: Mutex<VecDeque<ExecutionUnit>>,
    abort_all: AtomicBool,
    events: EventSender,
}

impl ExecutionInterceptor {
    pub(crate) fn new(
        registry: Arc<EndpointRegistry>,
        pending: Arc<PendingResultTable>,
        host: Arc<dyn ExecutionHost>,
        events: EventSender,
    ) -> Self {
        Self {
            registry,
            pending,
            host,
            captured: Mutex::new(VecDeque::new()),
            abort_all: AtomicBool::new(false),
            events,
        }
    }

    /// Queues a unit instead of running it. Replay happens from the
    /// scheduler loop once the readiness predicate holds.
    pub fn capture(&self, unit: ExecutionUnit) {
        debug!(unit = %unit.id, "execution unit captured");
        self.captured.lock().push_back(unit);
        let _ = self.events.send(SchedulerEvent::UnitCaptured);
    }

    pub fn captured_len(&self) -> usize {
        self.captured.lock().len()
    }

    pub fn abort_all(&self) -> bool {
        self.abort_all.load(Ordering::Acquire)
    }

    pub fn clear_abort(&self) {
        self.abort_all.store(false, Ordering::Release);
    }

    fn ready_to_proceed(&self) -> bool {
        self.pending.all_resolved() && self.registry.all_surface_ready()
    }

    /// Replays captured units in FIFO order while the predicate holds.
    fn drain_ready(&self) {
        let mut aborted_any = false;
        loop {
            if !self.ready_to_proceed() {
                return;
            }
            let unit = self.captured.lock().pop_front();
            let Some(unit) = unit else { break };
            if self.abort_all.load(Ordering::Acquire) {
                debug!(unit = %unit.id, "routing captured unit through abort path");
                self.host.abort(&unit);
                aborted_any = true;
            } else {
                if let Err(err) = self.host.execute(&unit) {
                    warn!(unit = %unit.id, error = %err, "execution unit failed; aborting subsequent units");
                    self.abort_all.store(true, Ordering::Release);
                }
                self.host.flush_io(&unit);
            }
        }
        // queue drained through the abort path: restore normal replay
        if aborted_any && self.captured.lock().is_empty() {
            self.abort_all.store(false, Ordering::Release);
            debug!("abort flag cleared after capture queue drained");
        }
    }

    pub(crate) async fn run(
        self: Arc<Self>,
        mut events: EventReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(_) => self.drain_ready(),
                    None => break,
                },
                _ = shutdown_flagged(&mut shutdown_rx) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::registry::EndpointPhase;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHost {
        executed: Mutex<Vec<String>>,
        aborted: Mutex<Vec<String>>,
        fail_ids: Mutex<Vec<String>>,
    }

    impl ExecutionHost for RecordingHost {
        fn execute(&self, unit: &ExecutionUnit) -> Result<(), HostError> {
            if self.fail_ids.lock().contains(&unit.id) {
                return Err(HostError(format!("unit {} exploded", unit.id)));
            }
            self.executed.lock().push(unit.id.clone());
            Ok(())
        }

        fn abort(&self, unit: &ExecutionUnit) {
            self.aborted.lock().push(unit.id.clone());
        }

        fn flush_io(&self, _unit: &ExecutionUnit) {}
    }

    fn unit(id: &str) -> ExecutionUnit {
        ExecutionUnit {
            id: id.into(),
            payload: json!({"source": id}),
            routing: ResponseRouting {
                stream: "shell".into(),
                identity: "caller".into(),
                parent: Value::Null,
            },
        }
    }

    fn fixture() -> (Arc<RecordingHost>, ExecutionInterceptor, Arc<EndpointRegistry>, Arc<PendingResultTable>) {
        let (tx, _rx) = events::channel();
        let registry = Arc::new(EndpointRegistry::new(tx.clone()));
        let pending = Arc::new(PendingResultTable::new(tx.clone()));
        let host = Arc::new(RecordingHost::default());
        let interceptor =
            ExecutionInterceptor::new(registry.clone(), pending.clone(), host.clone(), tx);
        (host, interceptor, registry, pending)
    }

    #[test]
    fn withholds_replay_while_reads_outstanding() {
        let (host, interceptor, _registry, pending) = fixture();
        let (ticket, _handle) = pending.track();
        interceptor.capture(unit("one"));
        interceptor.drain_ready();
        assert!(host.executed.lock().is_empty());
        assert_eq!(interceptor.captured_len(), 1);

        pending.resolve(ticket, Ok(Value::Null));
        interceptor.drain_ready();
        assert_eq!(host.executed.lock().clone(), vec!["one".to_string()]);
    }

    #[test]
    fn withholds_replay_until_every_endpoint_is_ready() {
        let (host, interceptor, registry, _pending) = fixture();
        let ready: String = "ready".into();
        let pending_endpoint: String = "slow".into();
        registry.register(&ready);
        registry.register(&pending_endpoint);
        registry.advance(&ready, EndpointPhase::SurfaceReady);

        interceptor.capture(unit("one"));
        interceptor.drain_ready();
        assert!(host.executed.lock().is_empty());

        registry.advance(&pending_endpoint, EndpointPhase::SurfaceReady);
        interceptor.drain_ready();
        assert_eq!(host.executed.lock().clone(), vec!["one".to_string()]);
    }

    #[test]
    fn failed_unit_aborts_subsequent_units_until_queue_drains() {
        let (host, interceptor, _registry, _pending) = fixture();
        host.fail_ids.lock().push("bad".into());

        interceptor.capture(unit("bad"));
        interceptor.drain_ready();
        assert!(interceptor.abort_all());

        interceptor.capture(unit("collateral"));
        interceptor.drain_ready();
        assert_eq!(host.aborted.lock().clone(), vec!["collateral".to_string()]);
        // the abort-path drain emptied the queue, so the flag resets
        assert!(!interceptor.abort_all());

        interceptor.capture(unit("fresh"));
        interceptor.drain_ready();
        assert_eq!(host.executed.lock().clone(), vec!["fresh".to_string()]);
    }

    #[test]
    fn clear_abort_restores_replay_before_queue_drains() {
        let (host, interceptor, _registry, pending) = fixture();
        host.fail_ids.lock().push("bad".into());

        interceptor.capture(unit("bad"));
        interceptor.drain_ready();
        assert!(interceptor.abort_all());

        // an outstanding read withholds replay while a unit sits queued
        let (ticket, _handle) = pending.track();
        interceptor.capture(unit("queued"));
        interceptor.drain_ready();
        assert_eq!(interceptor.captured_len(), 1);
        assert!(interceptor.abort_all());

        interceptor.clear_abort();
        pending.resolve(ticket, Ok(Value::Null));
        interceptor.drain_ready();
        assert_eq!(host.executed.lock().clone(), vec!["queued".to_string()]);
        assert!(host.aborted.lock().is_empty());
    }

    #[test]
    fn replay_preserves_capture_order() {
        let (host, interceptor, _registry, _pending) = fixture();
        interceptor.capture(unit("a"));
        interceptor.capture(unit("b"));
        interceptor.capture(unit("c"));
        interceptor.drain_ready();
        assert_eq!(
            host.executed.lock().clone(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
