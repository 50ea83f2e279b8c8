use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::ReadError;
use crate::events::{EventSender, SchedulerEvent};

/// Caller-facing half of an outstanding read. Awaiting it yields the
/// remote value, or the remote-side error at the point of consumption.
#[derive(Debug)]
pub struct ReadHandle {
    ticket: Uuid,
    reply: oneshot::Receiver<Result<Value, ReadError>>,
}

impl ReadHandle {
    pub fn ticket(&self) -> Uuid {
        self.ticket
    }

    pub async fn value(self) -> Result<Value, ReadError> {
        self.reply.await.unwrap_or(Err(ReadError::Shutdown))
    }
}

/// In-flight reads, keyed by ticket.
///
/// Resolution is the only signal that permits resuming queued
/// execution units: every resolve emits a [`SchedulerEvent`] so the
/// interceptor re-evaluates its predicate.
pub struct PendingResultTable {
    entries: Mutex<HashMap<Uuid, oneshot::Sender<Result<Value, ReadError>>>>,
    events: EventSender,
}

impl PendingResultTable {
    pub fn new(events: EventSender) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Tracks a fresh read and returns its ticket and handle. The read
    /// counts as unresolved from this moment, even while the command
    /// that issues it is still queued.
    pub fn track(&self) -> (Uuid, ReadHandle) {
        let ticket = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.entries.lock().insert(ticket, reply_tx);
        (
            ticket,
            ReadHandle {
                ticket,
                reply: reply_rx,
            },
        )
    }

    /// Resolves `ticket` with a value or error, fulfilling its handle.
    /// Unknown tickets (already resolved, or cleared) are ignored.
    pub fn resolve(&self, ticket: Uuid, result: Result<Value, ReadError>) {
        let Some(reply_tx) = self.entries.lock().remove(&ticket) else {
            return;
        };
        debug!(%ticket, ok = result.is_ok(), "read resolved");
        let _ = reply_tx.send(result);
        let _ = self.events.send(SchedulerEvent::ReadResolved { ticket });
    }

    /// True iff every tracked read has resolved or errored.
    pub fn all_resolved(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drops every outstanding entry. Their handles resolve with
    /// [`ReadError::Shutdown`].
    pub fn clear(&self) {
        let tickets: Vec<Uuid> = {
            let mut guard = self.entries.lock();
            let tickets = guard.keys().copied().collect();
            guard.clear();
            tickets
        };
        for ticket in tickets {
            let _ = self.events.send(SchedulerEvent::ReadResolved { ticket });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use serde_json::json;

    fn table() -> (PendingResultTable, events::EventReceiver) {
        let (tx, rx) = events::channel();
        (PendingResultTable::new(tx), rx)
    }

    #[tokio::test]
    async fn all_resolved_iff_no_outstanding_entries() {
        let (table, _rx) = table();
        assert!(table.all_resolved());

        let (first, first_handle) = table.track();
        let (second, second_handle) = table.track();
        assert_eq!(first_handle.ticket(), first);
        assert!(!table.all_resolved());
        assert_eq!(table.outstanding(), 2);

        table.resolve(first, Ok(json!(1)));
        assert!(!table.all_resolved());
        table.resolve(second, Err(ReadError::Dropped));
        assert!(table.all_resolved());

        assert_eq!(first_handle.value().await, Ok(json!(1)));
        assert_eq!(second_handle.value().await, Err(ReadError::Dropped));
    }

    #[tokio::test]
    async fn resolve_emits_scheduler_event() {
        let (table, mut rx) = table();
        let (ticket, _handle) = table.track();
        table.resolve(ticket, Ok(Value::Null));
        assert_eq!(rx.try_recv().unwrap(), SchedulerEvent::ReadResolved { ticket });
        // resolving twice is a no-op
        table.resolve(ticket, Ok(Value::Null));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn clear_fails_outstanding_handles() {
        let (table, mut rx) = table();
        let (_ticket, handle) = table.track();
        table.clear();
        assert!(table.all_resolved());
        assert!(rx.try_recv().is_ok());
        assert_eq!(handle.value().await, Err(ReadError::Shutdown));
    }
}
