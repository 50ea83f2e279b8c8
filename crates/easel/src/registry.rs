use std::collections::HashMap;

use parking_lot::Mutex;
use surface_bridge::EndpointId;
use tokio::sync::watch;
use tracing::debug;

use crate::events::{EventSender, SchedulerEvent};

/// Readiness of one remote rendering-surface instance. Monotonic:
/// `Created → SurfaceReady → DataReady`, no back-transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EndpointPhase {
    Created,
    /// The remote surface object exists.
    SurfaceReady,
    /// The surface has rendered its first payload.
    DataReady,
}

/// Tracks every endpoint created during a session and its phase.
///
/// Phases are published through per-endpoint watch channels so the
/// dispatch worker can await transitions; every effective advance also
/// emits a [`SchedulerEvent`] for the interceptor. An id is registered
/// before the proxy for it is handed to callers, so registration never
/// races with readiness updates.
pub struct EndpointRegistry {
    endpoints: Mutex<HashMap<EndpointId, watch::Sender<EndpointPhase>>>,
    events: EventSender,
}

impl EndpointRegistry {
    pub fn new(events: EventSender) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Registers `id` and returns a receiver for its phase. Reuses the
    /// existing channel if the id is already known.
    pub fn register(&self, id: &EndpointId) -> watch::Receiver<EndpointPhase> {
        let mut guard = self.endpoints.lock();
        guard
            .entry(id.clone())
            .or_insert_with(|| watch::channel(EndpointPhase::Created).0)
            .subscribe()
    }

    /// Advances `id` to `phase`. Returns true if the phase actually
    /// moved forward; repeated or backward advances are no-ops.
    pub fn advance(&self, id: &EndpointId, phase: EndpointPhase) -> bool {
        let advanced = {
            let guard = self.endpoints.lock();
            match guard.get(id) {
                Some(sender) if *sender.borrow() < phase => {
                    sender.send_replace(phase);
                    true
                }
                Some(_) => false,
                None => {
                    debug!(endpoint = %id, ?phase, "readiness signal for unknown endpoint");
                    false
                }
            }
        };
        if advanced {
            debug!(endpoint = %id, ?phase, "endpoint advanced");
            let _ = self.events.send(SchedulerEvent::EndpointAdvanced {
                endpoint: id.clone(),
                phase,
            });
        }
        advanced
    }

    pub fn phase(&self, id: &EndpointId) -> Option<EndpointPhase> {
        self.endpoints.lock().get(id).map(|sender| *sender.borrow())
    }

    /// Endpoints that have not yet reached [`EndpointPhase::SurfaceReady`].
    pub fn not_ready_ids(&self) -> Vec<EndpointId> {
        self.endpoints
            .lock()
            .iter()
            .filter(|(_, sender)| *sender.borrow() < EndpointPhase::SurfaceReady)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn all_surface_ready(&self) -> bool {
        self.endpoints
            .lock()
            .values()
            .all(|sender| *sender.borrow() >= EndpointPhase::SurfaceReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    fn registry() -> (EndpointRegistry, events::EventReceiver) {
        let (tx, rx) = events::channel();
        (EndpointRegistry::new(tx), rx)
    }

    #[test]
    fn advance_is_monotonic_and_idempotent() {
        let (registry, mut rx) = registry();
        let id: EndpointId = "viewer-1".into();
        registry.register(&id);

        assert!(registry.advance(&id, EndpointPhase::SurfaceReady));
        assert!(!registry.advance(&id, EndpointPhase::SurfaceReady));
        assert_eq!(registry.phase(&id), Some(EndpointPhase::SurfaceReady));

        assert!(registry.advance(&id, EndpointPhase::DataReady));
        assert!(!registry.advance(&id, EndpointPhase::SurfaceReady));
        assert_eq!(registry.phase(&id), Some(EndpointPhase::DataReady));

        // only the two effective advances were published
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn not_ready_tracks_surface_readiness() {
        let (registry, _rx) = registry();
        let one: EndpointId = "one".into();
        let two: EndpointId = "two".into();
        registry.register(&one);
        registry.register(&two);

        assert!(!registry.all_surface_ready());
        registry.advance(&one, EndpointPhase::SurfaceReady);
        assert_eq!(registry.not_ready_ids(), vec![two.clone()]);

        registry.advance(&two, EndpointPhase::DataReady);
        assert!(registry.not_ready_ids().is_empty());
        assert!(registry.all_surface_ready());
    }

    #[test]
    fn unknown_endpoint_signal_is_ignored() {
        let (registry, _rx) = registry();
        assert!(!registry.advance(&"ghost".into(), EndpointPhase::SurfaceReady));
    }
}
