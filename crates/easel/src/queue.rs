use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::command::{QueuedCommand, Tier};

/// What `submit` decided for a command.
#[derive(Debug)]
pub enum Submitted {
    /// Held in the backlog; the worker will drain it after readiness.
    Queued,
    /// The tier's gate is open: the caller dispatches it inline.
    Pass(QueuedCommand),
    /// The endpoint stalled past its readiness timeout; the command
    /// will never dispatch.
    Rejected(QueuedCommand),
}

#[derive(Default)]
struct Backlogs {
    immediate: VecDeque<QueuedCommand>,
    deferred: VecDeque<QueuedCommand>,
    immediate_open: bool,
    deferred_open: bool,
    poisoned: bool,
}

impl Backlogs {
    fn backlog_mut(&mut self, tier: Tier) -> &mut VecDeque<QueuedCommand> {
        match tier {
            Tier::Immediate => &mut self.immediate,
            Tier::Deferred => &mut self.deferred,
        }
    }

    fn gate(&self, tier: Tier) -> bool {
        match tier {
            Tier::Immediate => self.immediate_open,
            Tier::Deferred => self.deferred_open,
        }
    }

    fn open_gate(&mut self, tier: Tier) {
        match tier {
            Tier::Immediate => self.immediate_open = true,
            Tier::Deferred => self.deferred_open = true,
        }
    }
}

/// Per-endpoint FIFO backlogs, one per tier, plus a gate bit per tier.
///
/// The gate closes the race between "worker finished draining" and
/// "caller submitted a new command": `drain_or_open` only opens the
/// gate in the same critical section in which it observed an empty
/// backlog, so every command either lands in the backlog (and is
/// drained in order) or is passed back for inline dispatch after the
/// backlog is provably empty. One producer (the proxy), one consumer
/// (the worker).
#[derive(Default)]
pub struct CommandQueue {
    inner: Mutex<Backlogs>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, item: QueuedCommand) -> Submitted {
        let tier = item.command.tier();
        let mut guard = self.inner.lock();
        if guard.poisoned {
            Submitted::Rejected(item)
        } else if guard.gate(tier) {
            Submitted::Pass(item)
        } else {
            guard.backlog_mut(tier).push_back(item);
            Submitted::Queued
        }
    }

    /// Takes the tier's entire backlog. If the backlog was empty, opens
    /// the tier's gate instead so subsequent submissions pass through.
    pub fn drain_or_open(&self, tier: Tier) -> Vec<QueuedCommand> {
        let mut guard = self.inner.lock();
        if guard.backlog_mut(tier).is_empty() {
            guard.open_gate(tier);
            Vec::new()
        } else {
            std::mem::take(guard.backlog_mut(tier)).into()
        }
    }

    /// Marks the queue dead and returns everything still backed up, in
    /// tier order. Used when an endpoint stalls past its timeout.
    pub fn poison(&self) -> Vec<QueuedCommand> {
        let mut guard = self.inner.lock();
        guard.poisoned = true;
        let mut drained: Vec<QueuedCommand> = std::mem::take(&mut guard.immediate).into();
        drained.extend(std::mem::take(&mut guard.deferred));
        drained
    }

    pub fn len(&self, tier: Tier) -> usize {
        let mut guard = self.inner.lock();
        guard.backlog_mut(tier).len()
    }

    pub fn is_open(&self, tier: Tier) -> bool {
        self.inner.lock().gate(tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ViewerCommand;

    fn write(rgb: [f64; 3]) -> QueuedCommand {
        QueuedCommand {
            command: ViewerCommand::SetBackgroundColor(rgb),
            ticket: None,
        }
    }

    fn deferred() -> QueuedCommand {
        QueuedCommand {
            command: ViewerCommand::SetImageColorRange([0.0, 1.0]),
            ticket: None,
        }
    }

    #[test]
    fn backlog_preserves_fifo_order() {
        let queue = CommandQueue::new();
        for i in 0..3 {
            assert!(matches!(queue.submit(write([i as f64, 0.0, 0.0])), Submitted::Queued));
        }
        let drained = queue.drain_or_open(Tier::Immediate);
        let reds: Vec<f64> = drained
            .iter()
            .map(|item| match item.command {
                ViewerCommand::SetBackgroundColor(rgb) => rgb[0],
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(reds, vec![0.0, 1.0, 2.0]);
        assert_eq!(queue.len(Tier::Immediate), 0);
        // gate is still closed: the backlog was non-empty
        assert!(!queue.is_open(Tier::Immediate));
    }

    #[test]
    fn empty_drain_opens_gate() {
        let queue = CommandQueue::new();
        assert!(queue.drain_or_open(Tier::Immediate).is_empty());
        assert!(queue.is_open(Tier::Immediate));
        assert!(matches!(queue.submit(write([0.0; 3])), Submitted::Pass(_)));
        // tiers gate independently
        assert!(matches!(queue.submit(deferred()), Submitted::Queued));
    }

    #[test]
    fn poison_rejects_new_submissions() {
        let queue = CommandQueue::new();
        queue.submit(write([0.0; 3]));
        queue.submit(deferred());
        let drained = queue.poison();
        assert_eq!(drained.len(), 2);
        assert!(matches!(queue.submit(write([0.0; 3])), Submitted::Rejected(_)));
    }
}
