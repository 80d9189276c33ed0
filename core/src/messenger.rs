// Messenger: typed emit/on/off over one target window
use crate::context::WindowProxy;
use crate::event::{Envelope, Event, EventMap, Untyped};
use crate::handler::{Handler, HandlerId, HandlerResult};
use crate::origin::TargetOrigin;
use crate::window::{Listener, ListenerId, MessageEvent, MessageHost, WindowHandle};
use crate::{MessengerError, Result};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What a messenger is bound to.
#[derive(Clone)]
pub struct MessengerConfig {
    pub target: Arc<dyn WindowHandle>,
    /// Restricts delivery of outbound messages and filters inbound ones.
    pub target_origin: TargetOrigin,
}

impl MessengerConfig {
    pub fn new(target: impl WindowHandle + 'static) -> Self {
        Self {
            target: Arc::new(target),
            target_origin: TargetOrigin::Any,
        }
    }

    pub fn with_target_origin(mut self, target_origin: TargetOrigin) -> Self {
        self.target_origin = target_origin;
        self
    }
}

impl From<WindowProxy> for MessengerConfig {
    fn from(target: WindowProxy) -> Self {
        Self::new(target)
    }
}

impl From<Arc<dyn WindowHandle>> for MessengerConfig {
    fn from(target: Arc<dyn WindowHandle>) -> Self {
        Self {
            target,
            target_origin: TargetOrigin::Any,
        }
    }
}

impl fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("target_origin", &self.target_origin)
            .finish_non_exhaustive()
    }
}

/// Why an inbound message never reached a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    OriginMismatch,
    Malformed,
    Destroyed,
}

/// Result of dispatching one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Discarded(DiscardReason),
    Unhandled {
        tag: String,
    },
    Delivered {
        tag: String,
        /// Handlers called, including the ones that failed.
        invoked: usize,
        failed: usize,
    },
}

/// Messenger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerStats {
    pub sent: u64,
    pub received: u64,
    pub delivered: u64,
    pub origin_rejected: u64,
    pub malformed: u64,
    pub unhandled: u64,
    pub handler_failures: u64,
}

#[derive(Default)]
struct StatsCounters {
    sent: AtomicU64,
    received: AtomicU64,
    delivered: AtomicU64,
    origin_rejected: AtomicU64,
    malformed: AtomicU64,
    unhandled: AtomicU64,
    handler_failures: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MessengerStats {
        MessengerStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            origin_rejected: self.origin_rejected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

type ErasedHandler = dyn Fn(&Value) -> HandlerResult + Send + Sync;

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    call: Arc<ErasedHandler>,
}

impl Registration {
    fn from_handler<P>(handler: &Handler<P>) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        let handler = handler.clone();
        Self {
            id: handler.id(),
            call: Arc::new(move |payload: &Value| {
                let decoded = P::deserialize(payload)?;
                handler.call(decoded)
            }),
        }
    }
}

struct Inner {
    target: Arc<dyn WindowHandle>,
    target_origin: TargetOrigin,
    // Tag -> handlers in registration order
    registry: DashMap<String, Vec<Registration>>,
    destroyed: AtomicBool,
    stats: StatsCounters,
}

impl Inner {
    fn ensure_active(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(MessengerError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn dispatch(&self, event: &MessageEvent) -> DispatchOutcome {
        if self.destroyed.load(Ordering::Acquire) {
            return DispatchOutcome::Discarded(DiscardReason::Destroyed);
        }
        StatsCounters::bump(&self.stats.received, 1);

        if !self.target_origin.accepts(&event.origin) {
            StatsCounters::bump(&self.stats.origin_rejected, 1);
            trace!(
                "Ignoring message from {} (expecting {})",
                event.origin,
                self.target_origin
            );
            return DispatchOutcome::Discarded(DiscardReason::OriginMismatch);
        }

        let Some(envelope) = Envelope::from_data(&event.data) else {
            StatsCounters::bump(&self.stats.malformed, 1);
            trace!("Ignoring malformed message from {}", event.origin);
            return DispatchOutcome::Discarded(DiscardReason::Malformed);
        };

        // Snapshot so handlers may call on/off/destroy without deadlocking the map
        let handlers = match self.registry.get(&envelope.tag) {
            Some(entry) => entry.value().clone(),
            None => {
                StatsCounters::bump(&self.stats.unhandled, 1);
                trace!("No handlers for {}", envelope.tag);
                return DispatchOutcome::Unhandled { tag: envelope.tag };
            }
        };

        let mut invoked = 0;
        let mut failed = 0;
        for registration in &handlers {
            // Skip handlers removed (or cleared by destroy) earlier in this dispatch
            if !self.is_registered(&envelope.tag, registration.id) {
                continue;
            }
            invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (registration.call)(&envelope.payload)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(
                        "Handler {} for {} failed: {}",
                        registration.id, envelope.tag, e
                    );
                }
                Err(payload) => {
                    failed += 1;
                    warn!(
                        "Handler {} for {} panicked: {}",
                        registration.id,
                        envelope.tag,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        StatsCounters::bump(&self.stats.delivered, 1);
        StatsCounters::bump(&self.stats.handler_failures, failed as u64);
        debug!(
            "Dispatched {} to {} handlers ({} failed)",
            envelope.tag, invoked, failed
        );
        DispatchOutcome::Delivered {
            tag: envelope.tag,
            invoked,
            failed,
        }
    }

    fn is_registered(&self, tag: &str, id: HandlerId) -> bool {
        if self.destroyed.load(Ordering::Acquire) {
            return false;
        }
        self.registry
            .get(tag)
            .map(|handlers| handlers.iter().any(|existing| existing.id == id))
            .unwrap_or(false)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Typed publish/subscribe endpoint bound to one target window.
///
/// Construction registers one message listener on `host`; [`Messenger::destroy`]
/// (or dropping the messenger) removes exactly that listener and clears all
/// handlers. Once destroyed, `emit`, `on` and `off` return
/// [`MessengerError::Destroyed`].
///
/// Handlers for a tag run synchronously in registration order. A handler that
/// returns an error, panics or cannot decode the payload is logged and counted;
/// the remaining handlers still run.
pub struct Messenger<M: EventMap = Untyped> {
    inner: Arc<Inner>,
    host: Arc<dyn MessageHost>,
    listener: ListenerId,
    _map: PhantomData<fn() -> M>,
}

impl Messenger<Untyped> {
    /// Messenger that only uses string tags.
    pub fn untyped<H>(host: H, config: impl Into<MessengerConfig>) -> Self
    where
        H: MessageHost + 'static,
    {
        Self::new(host, config)
    }
}

impl<M: EventMap> Messenger<M> {
    pub fn new<H>(host: H, config: impl Into<MessengerConfig>) -> Self
    where
        H: MessageHost + 'static,
    {
        let config = config.into();
        let inner = Arc::new(Inner {
            target: config.target,
            target_origin: config.target_origin,
            registry: DashMap::new(),
            destroyed: AtomicBool::new(false),
            stats: StatsCounters::default(),
        });

        let weak = Arc::downgrade(&inner);
        let dispatcher: Listener = Arc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        });

        let host: Arc<dyn MessageHost> = Arc::new(host);
        let listener = host.add_message_listener(dispatcher);
        info!(
            "Messenger bound to target origin {} ({})",
            inner.target_origin, listener
        );

        Self {
            inner,
            host,
            listener,
            _map: PhantomData,
        }
    }

    /// Send `payload` as event `E` to the target window.
    pub fn emit<E>(&self, payload: &E::Payload) -> Result<()>
    where
        E: Event<Map = M>,
    {
        self.inner.ensure_active()?;
        let payload = serde_json::to_value(payload)?;
        self.emit_tag(E::TYPE, payload)
    }

    /// Send a raw payload under a string tag.
    pub fn emit_tag(&self, tag: &str, payload: Value) -> Result<()> {
        self.inner.ensure_active()?;
        let data = Envelope::new(tag, payload).into_data();
        debug!("Emitting {} to {}", tag, self.inner.target_origin);
        self.inner
            .target
            .post_message(data, &self.inner.target_origin);
        StatsCounters::bump(&self.inner.stats.sent, 1);
        Ok(())
    }

    /// Register `handler` for `E`. Returns false if it was already registered.
    pub fn on<E>(&self, handler: &Handler<E::Payload>) -> Result<bool>
    where
        E: Event<Map = M>,
    {
        self.register(E::TYPE, Registration::from_handler(handler))
    }

    /// Unregister `handler` from `E`. Returns false if it was not registered.
    pub fn off<E>(&self, handler: &Handler<E::Payload>) -> Result<bool>
    where
        E: Event<Map = M>,
    {
        self.unregister(E::TYPE, handler.id())
    }

    /// Wrap `f` in a [`Handler`], register it for `E` and return the handle.
    pub fn subscribe<E, F>(&self, f: F) -> Result<Handler<E::Payload>>
    where
        E: Event<Map = M>,
        F: Fn(E::Payload) + Send + Sync + 'static,
    {
        let handler = Handler::new(f);
        self.on::<E>(&handler)?;
        Ok(handler)
    }

    pub fn on_tag(&self, tag: &str, handler: &Handler<Value>) -> Result<bool> {
        self.register(tag, Registration::from_handler(handler))
    }

    pub fn off_tag(&self, tag: &str, handler: &Handler<Value>) -> Result<bool> {
        self.unregister(tag, handler.id())
    }

    fn register(&self, tag: &str, registration: Registration) -> Result<bool> {
        self.inner.ensure_active()?;
        let id = registration.id;
        let mut handlers = self
            .inner
            .registry
            .entry(tag.to_string())
            .or_insert_with(Vec::new);
        if handlers.iter().any(|existing| existing.id == id) {
            return Ok(false);
        }
        handlers.push(registration);
        debug!("Registered {} for {}", id, tag);
        Ok(true)
    }

    fn unregister(&self, tag: &str, id: HandlerId) -> Result<bool> {
        self.inner.ensure_active()?;
        let (removed, now_empty) = match self.inner.registry.get_mut(tag) {
            Some(mut handlers) => {
                let before = handlers.len();
                handlers.retain(|existing| existing.id != id);
                (handlers.len() != before, handlers.is_empty())
            }
            None => return Ok(false),
        };
        if now_empty {
            self.inner
                .registry
                .remove_if(tag, |_, handlers| handlers.is_empty());
        }
        if removed {
            debug!("Unregistered {} from {}", id, tag);
        }
        Ok(removed)
    }

    /// Run the dispatcher on one inbound message.
    ///
    /// The listener registered at construction calls this for every message
    /// the host receives; custom transports can call it directly.
    pub fn handle_message(&self, event: &MessageEvent) -> DispatchOutcome {
        self.inner.dispatch(event)
    }

    /// Unbind from the host and drop every handler. Safe to call repeatedly.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.host.remove_message_listener(self.listener);
        self.inner.registry.clear();
        info!(
            "Messenger for {} destroyed ({})",
            self.inner.target_origin, self.listener
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn target_origin(&self) -> &TargetOrigin {
        &self.inner.target_origin
    }

    /// Tags with at least one handler, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .inner
            .registry
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        tags.sort();
        tags
    }

    pub fn handler_count(&self, tag: &str) -> usize {
        self.inner
            .registry
            .get(tag)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> MessengerStats {
        self.inner.stats.snapshot()
    }
}

impl<M: EventMap> Drop for Messenger<M> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<M: EventMap> fmt::Debug for Messenger<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("target_origin", &self.inner.target_origin)
            .field("listener", &self.listener)
            .field("destroyed", &self.is_destroyed())
            .field("tags", &self.tags())
            .finish()
    }
}
