// In-process browsing contexts: windows, frames and the proxies between them
use crate::origin::{Origin, TargetOrigin};
use crate::window::{Listener, ListenerId, MessageEvent, MessageHost, WindowHandle};
use crate::Result;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

struct ContextInner {
    origin: Origin,
    queue: Mutex<VecDeque<MessageEvent>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    notify: Notify,
    closed: AtomicBool,
    parent: Option<Weak<ContextInner>>,
    opener: Option<Weak<ContextInner>>,
}

impl ContextInner {
    fn enqueue(&self, event: MessageEvent) {
        lock(&self.queue).push_back(event);
        self.notify.notify_one();
    }
}

/// A window-like execution context with its own message queue.
///
/// Posting to a context only queues the message; nothing reaches its
/// listeners until the queue is drained, either by [`BrowsingContext::pump`]
/// or by the task started with [`BrowsingContext::spawn_event_loop`].
/// Use one or the other for a given context, not both.
#[derive(Clone)]
pub struct BrowsingContext {
    inner: Arc<ContextInner>,
}

impl BrowsingContext {
    /// Create a top-level context for `origin`.
    pub fn new(origin: &str) -> Result<Self> {
        Ok(Self::with_links(Origin::parse(origin)?, None, None))
    }

    pub fn from_origin(origin: Origin) -> Self {
        Self::with_links(origin, None, None)
    }

    fn with_links(
        origin: Origin,
        parent: Option<Weak<ContextInner>>,
        opener: Option<Weak<ContextInner>>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                origin,
                queue: Mutex::new(VecDeque::new()),
                listeners: Mutex::new(Vec::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                parent,
                opener,
            }),
        }
    }

    /// Create a frame embedded in this context.
    pub fn embed_frame(&self, origin: &str) -> Result<Self> {
        let origin = Origin::parse(origin)?;
        debug!("Embedding frame {} in {}", origin, self.inner.origin);
        Ok(Self::with_links(
            origin,
            Some(Arc::downgrade(&self.inner)),
            None,
        ))
    }

    /// Create a window opened by this context.
    pub fn open_window(&self, origin: &str) -> Result<Self> {
        let origin = Origin::parse(origin)?;
        debug!("Opening window {} from {}", origin, self.inner.origin);
        Ok(Self::with_links(
            origin,
            None,
            Some(Arc::downgrade(&self.inner)),
        ))
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// The embedding context, seen from this one.
    pub fn parent(&self) -> Option<WindowProxy> {
        self.inner.parent.as_ref().map(|target| WindowProxy {
            target: target.clone(),
            source_origin: self.inner.origin.clone(),
        })
    }

    /// The context that opened this one, seen from this one.
    pub fn opener(&self) -> Option<WindowProxy> {
        self.inner.opener.as_ref().map(|target| WindowProxy {
            target: target.clone(),
            source_origin: self.inner.origin.clone(),
        })
    }

    /// Handle for posting from this context to `target`.
    pub fn proxy_to(&self, target: &BrowsingContext) -> WindowProxy {
        WindowProxy {
            target: Arc::downgrade(&target.inner),
            source_origin: self.inner.origin.clone(),
        }
    }

    /// Deliver every queued message, in order, to the listeners registered at
    /// delivery time. Returns how many messages were delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            if self.is_closed() {
                break;
            }
            let next = lock(&self.inner.queue).pop_front();
            let Some(event) = next else {
                break;
            };

            // Snapshot so listeners can add/remove listeners while running
            let listeners: Vec<Listener> = lock(&self.inner.listeners)
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in &listeners {
                listener(&event);
            }
            delivered += 1;
        }
        delivered
    }

    /// Drain the queue on a tokio task whenever messages arrive, until
    /// [`BrowsingContext::close`] is called.
    pub fn spawn_event_loop(&self) -> JoinHandle<()> {
        let ctx = self.clone();
        tokio::spawn(async move {
            debug!("Event loop started for {}", ctx.origin());
            loop {
                ctx.pump();
                if ctx.is_closed() {
                    break;
                }
                ctx.inner.notify.notified().await;
            }
            debug!("Event loop stopped for {}", ctx.origin());
        })
    }

    /// Close the context: queued messages are discarded and later posts are dropped.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = {
            let mut queue = lock(&self.inner.queue);
            let n = queue.len();
            queue.clear();
            n
        };
        debug!(
            "Closed context {} ({} queued messages discarded)",
            self.inner.origin, discarded
        );
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Messages waiting to be delivered.
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

impl MessageHost for BrowsingContext {
    fn add_message_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        lock(&self.inner.listeners).push((id, listener));
        trace!("Added {} to {}", id, self.inner.origin);
        id
    }

    fn remove_message_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if removed {
            trace!("Removed {} from {}", id, self.inner.origin);
        }
        removed
    }
}

impl fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("origin", &self.inner.origin)
            .field("closed", &self.is_closed())
            .field("pending", &self.pending())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// One context's view of another, used to post messages to it.
///
/// Messages posted through a proxy report the origin of the context that
/// created the proxy.
#[derive(Clone)]
pub struct WindowProxy {
    target: Weak<ContextInner>,
    source_origin: Origin,
}

impl WindowProxy {
    /// Whether the target is gone or closed.
    pub fn is_closed(&self) -> bool {
        match self.target.upgrade() {
            Some(target) => target.closed.load(Ordering::Acquire),
            None => true,
        }
    }
}

impl WindowHandle for WindowProxy {
    fn post_message(&self, data: serde_json::Value, target_origin: &TargetOrigin) {
        let Some(target) = self.target.upgrade() else {
            trace!("Dropping message from {}: target is gone", self.source_origin);
            return;
        };
        if target.closed.load(Ordering::Acquire) {
            trace!(
                "Dropping message from {}: {} is closed",
                self.source_origin,
                target.origin
            );
            return;
        }
        if !target_origin.accepts(target.origin.as_str()) {
            trace!(
                "Dropping message from {}: target origin {} does not match {}",
                self.source_origin,
                target_origin,
                target.origin
            );
            return;
        }
        target.enqueue(MessageEvent::new(data, self.source_origin.as_str()));
    }
}

impl fmt::Debug for WindowProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowProxy")
            .field("source_origin", &self.source_origin)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
