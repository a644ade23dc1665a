//! Subscription registry and envelope dispatch.
//!
//! Handlers are kept per category in registration order. Dispatch iterates a
//! snapshot, so a handler may subscribe or unsubscribe (itself or others)
//! while it runs. A panicking handler is isolated: the panic is caught and
//! logged, and the remaining handlers still receive the envelope.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, trace};

use crate::envelope::{Envelope, EventCategory};

/// A callback invoked for every envelope of the category it is subscribed to.
///
/// Identity (for [`Registry::unsubscribe`]) is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    by_category: HashMap<EventCategory, Vec<Entry>>,
}

/// Outcome of dispatching one envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned normally.
    pub delivered: usize,
    /// Handlers that panicked.
    pub failed: usize,
}

/// Maps event categories to handlers.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `category`.
    ///
    /// Registering the same handler twice for one category keeps a single
    /// registration; both returned tokens remove it.
    pub fn subscribe(&self, category: EventCategory, handler: Handler) -> Subscription {
        let mut inner = self.inner.write();
        let existing = inner.by_category.get(&category).and_then(|entries| {
            entries
                .iter()
                .find(|e| Arc::ptr_eq(&e.handler, &handler))
                .map(|e| e.id)
        });

        let id = if let Some(id) = existing {
            id
        } else {
            inner.next_id += 1;
            let id = inner.next_id;
            inner
                .by_category
                .entry(category.clone())
                .or_default()
                .push(Entry { id, handler });
            debug!(%category, id, "handler subscribed");
            id
        };

        Subscription {
            registry: Arc::downgrade(&self.inner),
            category,
            id,
        }
    }

    /// Remove `handler` from `category`. Returns whether it was registered.
    pub fn unsubscribe(&self, category: &EventCategory, handler: &Handler) -> bool {
        let mut inner = self.inner.write();
        remove_where(&mut inner, category, |e| Arc::ptr_eq(&e.handler, handler))
    }

    /// Number of handlers registered for `category`.
    pub fn handler_count(&self, category: &EventCategory) -> usize {
        self.inner
            .read()
            .by_category
            .get(category)
            .map_or(0, Vec::len)
    }

    /// Whether no handler is registered at all.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_category.is_empty()
    }

    /// Subscribe with a channel-backed stream; dropping the stream unsubscribes.
    pub fn stream(&self, category: EventCategory) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Handler = Arc::new(move |envelope: &Envelope| {
            // receiver gone means the stream is being dropped
            let _ = tx.send(envelope.clone());
        });
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
            subscription: self.subscribe(category, handler),
        }
    }

    /// Deliver `envelope` to every handler registered for its category.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let snapshot: Vec<(u64, Handler)> = {
            let inner = self.inner.read();
            match inner.by_category.get(envelope.category()) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.id, Arc::clone(&e.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut report = DispatchReport::default();
        if snapshot.is_empty() {
            trace!(category = %envelope.category(), "no handlers, envelope discarded");
            return report;
        }

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        category = %envelope.category(),
                        project_id = envelope.project_id(),
                        handler_id = id,
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        report
    }
}

fn remove_where(
    inner: &mut Inner,
    category: &EventCategory,
    pred: impl Fn(&Entry) -> bool,
) -> bool {
    let Some(entries) = inner.by_category.get_mut(category) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|e| !pred(e));
    let removed = entries.len() != before;
    if entries.is_empty() {
        let _ = inner.by_category.remove(category);
    }
    removed
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Token returned by [`Registry::subscribe`].
///
/// Dropping it does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
/// Calling it more than once is harmless.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<RwLock<Inner>>,
    category: EventCategory,
    id: u64,
}

impl Subscription {
    /// Category this token belongs to.
    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    /// Whether the registration is still in place.
    pub fn is_active(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let guard = inner.read();
        guard
            .by_category
            .get(&self.category)
            .is_some_and(|entries| entries.iter().any(|e| e.id == self.id))
    }

    /// Remove exactly this category/handler pairing.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut inner = inner.write();
            if remove_where(&mut inner, &self.category, |e| e.id == self.id) {
                debug!(category = %self.category, id = self.id, "handler unsubscribed");
            }
        }
    }
}

/// Stream of envelopes for one category.
///
/// Ends once every clone of the registry (client handle and driver) is gone.
pub struct EventStream {
    inner: UnboundedReceiverStream<Envelope>,
    subscription: Subscription,
}

impl EventStream {
    /// Next envelope, or `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        futures::StreamExt::next(&mut self.inner).await
    }

    /// Category this stream follows.
    pub fn category(&self) -> &EventCategory {
        self.subscription.category()
    }
}

impl Stream for EventStream {
    type Item = Envelope;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
