//! Synchronous event fan-out.
//!
//! Listeners register per [`EventKind`] and are invoked on the emitting
//! thread, in registration order. A listener that panics is isolated: the
//! panic is caught and logged, and remaining listeners for the same event
//! still run. Consumers are UI adapters that cannot sensibly catch
//! exceptions from inside event callbacks, so nothing propagates out of
//! `emit`.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
};

use crate::event::{EventKind, SessionEvent};

type Listener = Box<dyn Fn(&SessionEvent) + Send>;

/// Handle returned by [`Emitter::on`]; pass it to [`Emitter::off`] to
/// deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// The event kind this subscription listens for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Per-kind listener registry with synchronous fan-out.
#[derive(Default)]
pub struct Emitter {
    listeners: HashMap<EventKind, Vec<(u64, Listener)>>,
    next_id: u64,
}

impl Emitter {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    ///
    /// Every registration is distinct: registering the same closure twice
    /// yields two subscriptions and two invocations per event.
    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + Send + 'static,
    ) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.entry(kind).or_default().push((id, Box::new(listener)));
        Subscription { kind, id }
    }

    /// Deregister a listener. Returns false when the subscription was
    /// already removed.
    pub fn off(&mut self, subscription: Subscription) -> bool {
        let Some(entries) = self.listeners.get_mut(&subscription.kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.id);
        entries.len() != before
    }

    /// Invoke every listener registered for this event's kind.
    pub fn emit(&self, event: &SessionEvent) {
        let Some(entries) = self.listeners.get(&event.kind()) else {
            return;
        };
        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(listener = *id, kind = ?event.kind(), "event listener panicked");
            }
        }
    }

    /// Drop every registered listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Number of listeners currently registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn emit_reaches_only_matching_kind() {
        let mut emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        emitter.on(EventKind::Connected, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        let hits_clone = Arc::clone(&hits);
        emitter.on(EventKind::Disconnected, move |_| {
            hits_clone.fetch_add(100, Ordering::SeqCst);
        });

        emitter.emit(&SessionEvent::Connected);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_exactly_one_registration() {
        let mut emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = Arc::clone(&hits);
        let sub_a = emitter.on(EventKind::Connecting, move |_| {
            hits_a.fetch_add(1, Ordering::SeqCst);
        });
        let hits_b = Arc::clone(&hits);
        emitter.on(EventKind::Connecting, move |_| {
            hits_b.fetch_add(10, Ordering::SeqCst);
        });

        assert!(emitter.off(sub_a));
        assert!(!emitter.off(sub_a), "double off should be a no-op");

        emitter.emit(&SessionEvent::Connecting);

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(emitter.listener_count(EventKind::Connecting), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_later_listeners() {
        let mut emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        emitter.on(EventKind::Error, |_| {
            panic!("listener bug");
        });
        let hits_clone = Arc::clone(&hits);
        emitter.on(EventKind::Error, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&SessionEvent::Error { message: "m".to_owned() });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut emitter = Emitter::new();
        emitter.on(EventKind::Step, |_| {});
        emitter.on(EventKind::Response, |_| {});

        emitter.clear();

        assert_eq!(emitter.listener_count(EventKind::Step), 0);
        assert_eq!(emitter.listener_count(EventKind::Response), 0);
    }
}
