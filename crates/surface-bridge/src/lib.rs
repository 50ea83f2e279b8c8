use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Identity of one remote rendering-surface instance.
pub type EndpointId = String;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("remote surface disconnected")]
    Disconnected,
    #[error("remote surface does not support method {0}")]
    UnsupportedMethod(String),
    #[error("remote call failed: {0}")]
    Remote(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Receiver for the reply to an in-flight request/reply call.
pub type ReplyReceiver = oneshot::Receiver<BridgeResult<Value>>;

/// Async method-call semantics against a named remote object.
///
/// Payloads are already wire-ready (the format/codec layer runs before
/// commands reach the bridge). Both entry points resolve once the
/// message is on the wire, so calling them in sequence preserves
/// delivery order; replies are observed separately via [`ReplyReceiver`].
#[async_trait]
pub trait SurfaceBridge: Send + Sync {
    /// Fire-and-forget method call. No reply is ever delivered.
    async fn notify(&self, target: &EndpointId, method: &str, payload: Value) -> BridgeResult<()>;

    /// Request/reply method call. The returned receiver yields the
    /// remote value or the remote-side error.
    async fn call(&self, target: &EndpointId, method: &str, payload: Value)
        -> BridgeResult<ReplyReceiver>;
}

/// In-memory bridge for tests and non-remote contexts.
///
/// `setFoo` stores the payload under the property `foo`; `getFoo`
/// returns it (or `null`). `captureImage` returns whatever `setImage`
/// last stored.
#[derive(Debug, Default)]
pub struct LoopbackBridge {
    properties: Mutex<HashMap<EndpointId, HashMap<String, Value>>>,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, target: &EndpointId, key: String, payload: Value) {
        let mut guard = self.properties.lock();
        guard.entry(target.clone()).or_default().insert(key, payload);
    }

    fn fetch(&self, target: &EndpointId, key: &str) -> Value {
        let guard = self.properties.lock();
        guard
            .get(target)
            .and_then(|props| props.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

fn property_key(method: &str) -> Option<String> {
    let rest = method.strip_prefix("set").or_else(|| method.strip_prefix("get"))?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    Some(first.to_lowercase().collect::<String>() + chars.as_str())
}

#[async_trait]
impl SurfaceBridge for LoopbackBridge {
    async fn notify(&self, target: &EndpointId, method: &str, payload: Value) -> BridgeResult<()> {
        if !method.starts_with("set") {
            return Err(BridgeError::UnsupportedMethod(method.to_string()));
        }
        let key = property_key(method)
            .ok_or_else(|| BridgeError::UnsupportedMethod(method.to_string()))?;
        debug!(target = %target, method, "loopback notify");
        self.store(target, key, payload);
        Ok(())
    }

    async fn call(&self, target: &EndpointId, method: &str, _payload: Value)
        -> BridgeResult<ReplyReceiver> {
        let value = if method == "captureImage" {
            self.fetch(target, "image")
        } else if method.starts_with("get") {
            let key = property_key(method)
                .ok_or_else(|| BridgeError::UnsupportedMethod(method.to_string()))?;
            self.fetch(target, &key)
        } else {
            return Err(BridgeError::UnsupportedMethod(method.to_string()));
        };
        debug!(target = %target, method, "loopback call");
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = reply_tx.send(Ok(value));
        Ok(reply_rx)
    }
}
