use surface_bridge::EndpointId;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::registry::EndpointPhase;

/// Wakeups for the execution interceptor. The registry and the pending
/// table publish here instead of calling into the interceptor directly,
/// which keeps the worker and host scheduling contexts decoupled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    EndpointAdvanced {
        endpoint: EndpointId,
        phase: EndpointPhase,
    },
    ReadResolved {
        ticket: Uuid,
    },
    UnitCaptured,
}

pub type EventSender = mpsc::UnboundedSender<SchedulerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SchedulerEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
