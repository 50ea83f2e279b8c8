use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use surface_bridge::{EndpointId, SurfaceBridge};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::command::{QueuedCommand, Tier};
use crate::error::{ReadError, SessionError};
use crate::pending::PendingResultTable;
use crate::queue::CommandQueue;
use crate::registry::EndpointPhase;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) type WorkerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Dedicated scheduling loop, isolated from any host runtime.
///
/// Owns an OS thread running a current-thread tokio runtime. The
/// session feeds it per-endpoint flusher and dispatcher tasks (plus
/// the interceptor loop); cross-thread traffic is channel-only.
pub struct DispatchWorker {
    spawn_tx: mpsc::UnboundedSender<WorkerTask>,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DispatchWorker {
    pub(crate) fn spawn() -> Result<Self, SessionError> {
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread = thread::Builder::new()
            .name("easel-dispatch".into())
            .spawn(move || runtime.block_on(worker_main(spawn_rx, shutdown_rx)))?;
        Ok(Self {
            spawn_tx,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn spawn_task(&self, task: impl Future<Output = ()> + Send + 'static) {
        if self.spawn_tx.send(Box::pin(task)).is_err() {
            warn!("dispatch worker is gone; task dropped");
        }
    }

    pub(crate) fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signals shutdown and joins the worker thread.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        // signal without joining: drop must not block a host thread
        let _ = self.shutdown_tx.send(true);
    }
}

async fn worker_main(
    mut spawn_rx: mpsc::UnboundedReceiver<WorkerTask>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            task = spawn_rx.recv() => match task {
                Some(task) => {
                    tasks.spawn(task);
                }
                None => break,
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }
    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("dispatch worker shut down with tasks still in flight");
    }
}

enum PhaseWait {
    Reached,
    TimedOut,
    Closed,
}

async fn await_phase(
    phase_rx: &mut watch::Receiver<EndpointPhase>,
    goal: EndpointPhase,
    limit: Option<Duration>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PhaseWait {
    match limit {
        Some(limit) => tokio::select! {
            reached = phase_rx.wait_for(|phase| *phase >= goal) => match reached {
                Ok(_) => PhaseWait::Reached,
                Err(_) => PhaseWait::Closed,
            },
            _ = tokio::time::sleep(limit) => PhaseWait::TimedOut,
            _ = shutdown_flagged(shutdown_rx) => PhaseWait::Closed,
        },
        None => tokio::select! {
            reached = phase_rx.wait_for(|phase| *phase >= goal) => match reached {
                Ok(_) => PhaseWait::Reached,
                Err(_) => PhaseWait::Closed,
            },
            _ = shutdown_flagged(shutdown_rx) => PhaseWait::Closed,
        },
    }
}

pub(crate) async fn shutdown_flagged(shutdown_rx: &mut watch::Receiver<bool>) {
    // resolves on the flag or on the session going away
    let _ = shutdown_rx.wait_for(|flag| *flag).await;
}

/// Waits out an endpoint's two readiness signals, draining each tier's
/// backlog into the dispatch channel as its gate condition is met.
/// Ends with both gates open (inline dispatch) or the queue poisoned
/// (stall past the configured timeout).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn flush_endpoint(
    endpoint: EndpointId,
    queue: Arc<CommandQueue>,
    pending: Arc<PendingResultTable>,
    mut phase_rx: watch::Receiver<EndpointPhase>,
    dispatch_tx: mpsc::UnboundedSender<QueuedCommand>,
    ready_timeout: Option<Duration>,
    data_ready_timeout: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let stages = [
        (Tier::Immediate, EndpointPhase::SurfaceReady, ready_timeout),
        (Tier::Deferred, EndpointPhase::DataReady, data_ready_timeout),
    ];
    for (tier, goal, limit) in stages {
        match await_phase(&mut phase_rx, goal, limit, &mut shutdown_rx).await {
            PhaseWait::Reached => {}
            PhaseWait::TimedOut => {
                fail_stalled(&endpoint, &queue, &pending);
                return;
            }
            PhaseWait::Closed => return,
        }
        debug!(endpoint = %endpoint, ?goal, "endpoint readiness reached; draining backlog");
        loop {
            let batch = queue.drain_or_open(tier);
            if batch.is_empty() {
                break;
            }
            for item in batch {
                if dispatch_tx.send(item).is_err() {
                    return;
                }
            }
        }
    }
}

fn fail_stalled(endpoint: &EndpointId, queue: &CommandQueue, pending: &PendingResultTable) {
    let stranded = queue.poison();
    let mut dropped_writes = 0usize;
    for item in stranded {
        match item.ticket {
            Some(ticket) => pending.resolve(ticket, Err(ReadError::EndpointTimeout)),
            None => dropped_writes += 1,
        }
    }
    warn!(
        endpoint = %endpoint,
        dropped_writes,
        "endpoint never became ready; queued commands abandoned"
    );
}

/// Consumes an endpoint's dispatch channel strictly in order. Writes
/// are fire-and-forget; read replies are awaited on an owned task set
/// so slow remotes never block later sends. The task set is drained
/// before exit.
pub(crate) async fn dispatch_endpoint(
    endpoint: EndpointId,
    bridge: Arc<dyn SurfaceBridge>,
    pending: Arc<PendingResultTable>,
    mut dispatch_rx: mpsc::UnboundedReceiver<QueuedCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut replies: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            item = dispatch_rx.recv() => match item {
                Some(item) => dispatch_one(&endpoint, &bridge, &pending, &mut replies, item).await,
                None => break,
            },
            _ = shutdown_flagged(&mut shutdown_rx) => break,
            Some(_) = replies.join_next(), if !replies.is_empty() => {}
        }
    }
    while replies.join_next().await.is_some() {}
}

async fn dispatch_one(
    endpoint: &EndpointId,
    bridge: &Arc<dyn SurfaceBridge>,
    pending: &Arc<PendingResultTable>,
    replies: &mut JoinSet<()>,
    item: QueuedCommand,
) {
    let method = item.command.method();
    let payload = item.command.payload();
    match item.ticket {
        None => {
            // no caller is awaiting this; the failure is logged and swallowed
            if let Err(err) = bridge.notify(endpoint, method, payload).await {
                warn!(endpoint = %endpoint, method, error = %err, "fire-and-forget dispatch failed");
            }
        }
        Some(ticket) => match bridge.call(endpoint, method, payload).await {
            Ok(reply_rx) => {
                let pending = pending.clone();
                replies.spawn(async move {
                    let result = match reply_rx.await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(err.into()),
                        Err(_) => Err(ReadError::Dropped),
                    };
                    pending.resolve(ticket, result);
                });
            }
            Err(err) => pending.resolve(ticket, Err(err.into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_runs_spawned_tasks() {
        let mut worker = DispatchWorker::spawn().expect("worker spawns");
        let (tx, rx) = std::sync::mpsc::channel();
        worker.spawn_task(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        worker.shutdown();
    }
}
