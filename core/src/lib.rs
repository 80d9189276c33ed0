// Crossframe Core Library
// Typed publish/subscribe between window-like contexts over postMessage-style transports

pub mod context;
pub mod event;
pub mod handler;
pub mod messenger;
pub mod origin;
pub mod window;

// Export core types
pub use context::{BrowsingContext, WindowProxy};
pub use event::{Envelope, Event, EventMap, Untyped};
pub use handler::{Handler, HandlerError, HandlerId, HandlerResult};
pub use messenger::{DiscardReason, DispatchOutcome, Messenger, MessengerConfig, MessengerStats};
pub use origin::{Origin, TargetOrigin, WILDCARD};
pub use window::{Listener, ListenerId, MessageEvent, MessageHost, WindowHandle};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Messenger has been destroyed")]
    Destroyed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, MessengerError>;
