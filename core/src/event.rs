// Event maps, typed events and the wire envelope
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Compile-time contract shared by both peers. Has no runtime representation.
pub trait EventMap: 'static {}

/// One named event of an [`EventMap`] and the payload it carries.
pub trait Event: 'static {
    type Map: EventMap;
    type Payload: Serialize + DeserializeOwned + Send + 'static;

    /// Tag sent on the wire as `type`.
    const TYPE: &'static str;
}

/// Map without declared events, for messengers that only use string tags.
#[derive(Debug, Clone, Copy)]
pub enum Untyped {}

impl EventMap for Untyped {}

/// Declare an event map and its events.
///
/// ```
/// use crossframe_core::event_map;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct ReadyPayload {
///     pub time: u64,
/// }
///
/// event_map! {
///     pub FrameEvents {
///         Ready("ready") => ReadyPayload,
///         Pong("pong") => String,
///     }
/// }
///
/// use crossframe_core::Event;
/// assert_eq!(<Ready as Event>::TYPE, "ready");
/// ```
#[macro_export]
macro_rules! event_map {
    (
        $(#[$map_meta:meta])*
        $vis:vis $map:ident {
            $(
                $(#[$event_meta:meta])*
                $event:ident($tag:literal) => $payload:ty
            ),* $(,)?
        }
    ) => {
        $(#[$map_meta])*
        #[derive(Debug, Clone, Copy)]
        $vis enum $map {}

        impl $crate::EventMap for $map {}

        $(
            $(#[$event_meta])*
            #[derive(Debug, Clone, Copy)]
            $vis enum $event {}

            impl $crate::Event for $event {
                type Map = $map;
                type Payload = $payload;
                const TYPE: &'static str = $tag;
            }
        )*
    };
}

/// Wire unit: `{ "type": tag, "payload": value }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Unwrap a received message body.
    ///
    /// Returns `None` unless the body is an object with a string `type`.
    /// A missing `payload` unwraps as `null`.
    pub fn from_data(data: &Value) -> Option<Self> {
        let object = data.as_object()?;
        let tag = object.get("type")?.as_str()?;
        let payload = object.get("payload").cloned().unwrap_or(Value::Null);
        Some(Self::new(tag, payload))
    }

    pub fn into_data(self) -> Value {
        serde_json::json!({
            "type": self.tag,
            "payload": self.payload,
        })
    }
}
