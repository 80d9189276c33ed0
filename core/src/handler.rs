// Handler handles with stable identity
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Identity of a handler; shared by all clones of the same [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler_{}", self.0)
    }
}

/// A payload callback that can be registered and later unregistered.
///
/// Closures have no identity of their own, so registration goes through this
/// handle: registering the same handle twice for a tag is a no-op, and
/// `off` with a clone of the handle removes it.
pub struct Handler<P> {
    id: HandlerId,
    func: Arc<dyn Fn(P) -> HandlerResult + Send + Sync>,
}

impl<P: 'static> Handler<P> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        Self::fallible(move |payload| {
            f(payload);
            Ok(())
        })
    }

    /// Handler whose errors are logged and counted by the dispatcher.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(P) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            id: HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)),
            func: Arc::new(f),
        }
    }
}

impl<P> Handler<P> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn call(&self, payload: P) -> HandlerResult {
        (self.func)(payload)
    }
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            func: Arc::clone(&self.func),
        }
    }
}

impl<P> PartialEq for Handler<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for Handler<P> {}

impl<P> fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn clones_share_identity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = Handler::new(move |n: usize| {
            counter.fetch_add(n, Ordering::SeqCst);
        });
        let clone = handler.clone();
        let other = Handler::new(|_: usize| {});

        assert_eq!(handler, clone);
        assert_ne!(handler.id(), other.id());

        clone.call(2).unwrap();
        handler.call(3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn fallible_handlers_return_their_error() {
        let handler = Handler::fallible(|n: i32| {
            if n < 0 {
                Err("negative".into())
            } else {
                Ok(())
            }
        });
        assert!(handler.call(1).is_ok());
        let err = handler.call(-1).unwrap_err();
        assert_eq!(err.to_string(), "negative");
    }
}
