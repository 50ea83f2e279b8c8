use std::sync::Arc;

use serde_json::Value;
use surface_bridge::EndpointId;
use tokio::sync::mpsc;
use tracing::warn;

use crate::command::{CommandKind, QueuedCommand, Tier, ViewerCommand};
use crate::error::ReadError;
use crate::pending::{PendingResultTable, ReadHandle};
use crate::queue::{CommandQueue, Submitted};

/// Public façade over one remote rendering surface.
///
/// Writes dispatch inline when the endpoint's tier gate is open and
/// queue otherwise; either way they never fail at the call site. Reads
/// always return a [`ReadHandle`] that is tracked in the pending table
/// from the moment of the call, so execution units captured afterwards
/// cannot replay until the read resolves — a read issued after a write
/// on the same endpoint therefore observes the write's effect.
///
/// One logical producer: proxy methods are meant to be called from the
/// host's execution context, not shared across threads.
pub struct ViewerProxy {
    endpoint: EndpointId,
    queue: Arc<CommandQueue>,
    dispatch_tx: mpsc::UnboundedSender<QueuedCommand>,
    pending: Arc<PendingResultTable>,
}

impl ViewerProxy {
    pub(crate) fn new(
        endpoint: EndpointId,
        queue: Arc<CommandQueue>,
        dispatch_tx: mpsc::UnboundedSender<QueuedCommand>,
        pending: Arc<PendingResultTable>,
    ) -> Self {
        Self {
            endpoint,
            queue,
            dispatch_tx,
            pending,
        }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// True once `tier` commands dispatch inline instead of queueing,
    /// i.e. the worker has drained the tier's backlog dry.
    pub fn dispatches_inline(&self, tier: Tier) -> bool {
        self.queue.is_open(tier)
    }

    fn write(&self, command: ViewerCommand) {
        debug_assert_eq!(command.kind(), CommandKind::Write);
        let item = QueuedCommand {
            command,
            ticket: None,
        };
        match self.queue.submit(item) {
            Submitted::Queued => {}
            Submitted::Pass(item) => {
                if self.dispatch_tx.send(item).is_err() {
                    warn!(endpoint = %self.endpoint, "dispatch channel closed; write dropped");
                }
            }
            Submitted::Rejected(item) => {
                warn!(
                    endpoint = %self.endpoint,
                    method = item.command.method(),
                    "endpoint stalled; write dropped"
                );
            }
        }
    }

    fn read(&self, command: ViewerCommand) -> ReadHandle {
        debug_assert_eq!(command.kind(), CommandKind::Read);
        let (ticket, handle) = self.pending.track();
        let item = QueuedCommand {
            command,
            ticket: Some(ticket),
        };
        match self.queue.submit(item) {
            Submitted::Queued => {}
            Submitted::Pass(item) => {
                if self.dispatch_tx.send(item).is_err() {
                    self.pending.resolve(ticket, Err(ReadError::Shutdown));
                }
            }
            Submitted::Rejected(_) => {
                self.pending.resolve(ticket, Err(ReadError::EndpointTimeout));
            }
        }
        handle
    }

    /// Loads an image payload (already wire-ready) into the viewer.
    pub fn set_image(&self, image: Value) {
        self.write(ViewerCommand::SetImage(image));
    }

    pub fn set_background_color(&self, rgb: [f64; 3]) {
        self.write(ViewerCommand::SetBackgroundColor(rgb));
    }

    pub fn get_background_color(&self) -> ReadHandle {
        self.read(ViewerCommand::GetBackgroundColor)
    }

    pub fn set_color_map(&self, name: impl Into<String>) {
        self.write(ViewerCommand::SetColorMap(name.into()));
    }

    pub fn get_color_map(&self) -> ReadHandle {
        self.read(ViewerCommand::GetColorMap)
    }

    pub fn set_annotations_enabled(&self, enabled: bool) {
        self.write(ViewerCommand::SetAnnotationsEnabled(enabled));
    }

    pub fn set_rotate_enabled(&self, enabled: bool) {
        self.write(ViewerCommand::SetRotateEnabled(enabled));
    }

    pub fn set_ui_collapsed(&self, collapsed: bool) {
        self.write(ViewerCommand::SetUiCollapsed(collapsed));
    }

    pub fn set_axes_enabled(&self, enabled: bool) {
        self.write(ViewerCommand::SetAxesEnabled(enabled));
    }

    /// Requires rendered data; queued until the endpoint reports it.
    pub fn set_image_color_range(&self, range: [f64; 2]) {
        self.write(ViewerCommand::SetImageColorRange(range));
    }

    pub fn get_image_color_range(&self) -> ReadHandle {
        self.read(ViewerCommand::GetImageColorRange)
    }

    /// Captures the current rendering as an image payload.
    pub fn capture_image(&self) -> ReadHandle {
        self.read(ViewerCommand::CaptureImage)
    }
}
