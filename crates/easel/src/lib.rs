//! Easel: command queueing and cooperative scheduling between a host
//! that runs discrete execution units and a remote rendering surface
//! that initializes asynchronously.
//!
//! Responsibilities:
//! - queueing proxy method calls until the remote surface (and, for
//!   some calls, its first rendered payload) exists
//! - draining those queues in order from a dedicated dispatch worker
//! - tracking outstanding reads so later execution units never observe
//!   state a prior read has not yet fetched
//! - holding back captured execution units until every endpoint is
//!   ready and every read has resolved

pub mod command;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod pending;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod worker;

pub use command::{CommandKind, Tier, ViewerCommand};
pub use error::{HostError, ReadError, SessionError};
pub use interceptor::{ExecutionHost, ExecutionInterceptor, ExecutionUnit, ResponseRouting};
pub use pending::{PendingResultTable, ReadHandle};
pub use proxy::ViewerProxy;
pub use registry::{EndpointPhase, EndpointRegistry};
pub use session::{SessionConfig, ViewerSession};
pub use surface_bridge::{
    BridgeError, BridgeResult, EndpointId, LoopbackBridge, ReplyReceiver, SurfaceBridge,
};
