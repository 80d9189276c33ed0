// Transport seam: window-like targets and the ambient message facility
use crate::origin::TargetOrigin;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// A message as delivered to the receiving context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Cloned message body.
    pub data: serde_json::Value,
    /// Origin of the sending context, as reported by the transport.
    pub origin: String,
}

impl MessageEvent {
    pub fn new(data: serde_json::Value, origin: impl Into<String>) -> Self {
        Self {
            data,
            origin: origin.into(),
        }
    }
}

/// Token for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

pub type Listener = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

/// Something messages can be posted to (a window, frame or opened window).
pub trait WindowHandle: Send + Sync {
    /// Queue `data` for delivery. Delivery failures are never reported back.
    fn post_message(&self, data: serde_json::Value, target_origin: &TargetOrigin);
}

/// The "message received" facility of the current execution context.
pub trait MessageHost: Send + Sync {
    fn add_message_listener(&self, listener: Listener) -> ListenerId;

    /// Remove exactly the listener registered under `id`.
    /// Returns false if it was not (or no longer) registered.
    fn remove_message_listener(&self, id: ListenerId) -> bool;
}

impl<T: WindowHandle + ?Sized> WindowHandle for Arc<T> {
    fn post_message(&self, data: serde_json::Value, target_origin: &TargetOrigin) {
        (**self).post_message(data, target_origin)
    }
}

impl<T: MessageHost + ?Sized> MessageHost for Arc<T> {
    fn add_message_listener(&self, listener: Listener) -> ListenerId {
        (**self).add_message_listener(listener)
    }

    fn remove_message_listener(&self, id: ListenerId) -> bool {
        (**self).remove_message_listener(id)
    }
}
