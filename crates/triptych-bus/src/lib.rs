#![forbid(unsafe_code)]

//! Broadcast bus: a generic, single-threaded publish/subscribe primitive.
//!
//! [`Bus<T>`] pairs a payload (Triptych hands it the context handle of the
//! store it serves) with a listener registry shared between all clones of
//! the handle. Listeners are zero-argument callbacks: a publish tells
//! subscribers *that* something changed, and each subscriber re-reads
//! whatever it observes through the payload.
//!
//! # Invariants
//!
//! 1. Listeners are notified in subscription order.
//! 2. `publish()` is synchronous: every listener has returned before
//!    `publish()` returns.
//! 3. The listener set is snapshotted at the start of a publish. Listeners
//!    added or removed mid-sweep take effect from the next publish.
//! 4. [`Unsubscribe::unsubscribe`] removes exactly one listener. Calling it
//!    again, or after the bus itself is gone, is a no-op.
//!
//! # Failure Modes
//!
//! - **Listener panics**: the panic unwinds through `publish()`, aborting
//!   delivery to later listeners. The bus does not catch or suppress it;
//!   a subscriber that must not disturb its siblings has to contain its
//!   own panics.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

/// Opaque handle identifying one registered listener.
///
/// Unique per bus for the bus's lifetime; ids are never reused, so removal
/// by id is naturally idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

type Listener = Rc<dyn Fn()>;

/// Listener registry shared by every clone of a [`Bus`].
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl Registry {
    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }
}

/// A cheaply-cloneable publish/subscribe handle.
///
/// Clones share the same payload and listener registry, so a bus can be
/// handed to collaborators outside the store that created it.
pub struct Bus<T> {
    payload: Rc<T>,
    registry: Rc<RefCell<Registry>>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            payload: Rc::clone(&self.payload),
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.registry.try_borrow() {
            Ok(registry) => f
                .debug_struct("Bus")
                .field("listeners", &registry.listeners.len())
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Bus { <publishing> }"),
        }
    }
}

impl<T> Bus<T> {
    /// Create a bus carrying `payload`.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            payload: Rc::new(payload),
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// The value this bus broadcasts about.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Register `listener` and return its disposer.
    ///
    /// Listeners run in subscription order. A listener that captures a
    /// strong handle back to whatever owns this bus keeps that owner alive
    /// for as long as it stays subscribed; capture a weak handle where that
    /// matters.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Unsubscribe {
        let mut registry = self.registry.borrow_mut();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, Rc::new(listener)));
        trace!(id = id.raw(), "listener subscribed");
        Unsubscribe {
            registry: Rc::downgrade(&self.registry),
            id,
        }
    }

    /// Notify every current listener, in subscription order, with no
    /// payload.
    ///
    /// The listener set is snapshotted first, so a listener may subscribe
    /// or unsubscribe mid-sweep without invalidating the current one.
    pub fn publish(&self) {
        let snapshot: Vec<Listener> = self
            .registry
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        trace!(listeners = snapshot.len(), "publish");
        for listener in snapshot {
            listener();
        }
    }

    /// Handles of all currently registered listeners, in subscription
    /// order.
    #[must_use]
    pub fn listeners(&self) -> Vec<ListenerId> {
        self.registry
            .borrow()
            .listeners
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether any listener is currently subscribed.
    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.registry.borrow().listeners.is_empty()
    }
}

/// Disposer returned by [`Bus::subscribe`].
///
/// Holds only a weak reference to the registry: an outstanding disposer
/// never keeps a bus alive. This is not an RAII guard — dropping it without
/// calling [`unsubscribe`](Self::unsubscribe) leaves the listener
/// registered for the bus's lifetime.
#[derive(Debug)]
pub struct Unsubscribe {
    registry: Weak<RefCell<Registry>>,
    id: ListenerId,
}

impl Unsubscribe {
    /// Remove the listener this disposer was created for.
    ///
    /// Safe to call more than once; the second and later calls are no-ops,
    /// as is calling it after the bus has been dropped.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.borrow_mut().remove(self.id) {
                trace!(id = self.id.raw(), "listener unsubscribed");
            }
        }
    }

    /// The handle of the listener this disposer removes.
    #[must_use]
    pub fn listener_id(&self) -> ListenerId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn publish_invokes_in_subscription_order() {
        let bus = Bus::new(());
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            // Discarding the disposer does not unsubscribe.
            let _ = bus.subscribe(move || order.borrow_mut().push(tag));
        }

        bus.publish();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn publish_without_listeners_is_a_noop() {
        let bus = Bus::new(42u32);
        bus.publish();
        assert_eq!(*bus.payload(), 42);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_listener() {
        let bus = Bus::new(());
        let hits_a = Rc::new(Cell::new(0));
        let hits_b = Rc::new(Cell::new(0));

        let a = Rc::clone(&hits_a);
        let unsub_a = bus.subscribe(move || a.set(a.get() + 1));
        let b = Rc::clone(&hits_b);
        let _unsub_b = bus.subscribe(move || b.set(b.get() + 1));

        bus.publish();
        unsub_a.unsubscribe();
        bus.publish();

        assert_eq!(hits_a.get(), 1);
        assert_eq!(hits_b.get(), 2);
    }

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let bus = Bus::new(());
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&hits);
        let unsub = bus.subscribe(move || h.set(h.get() + 1));
        let h = Rc::clone(&hits);
        let _other = bus.subscribe(move || h.set(h.get() + 1));

        unsub.unsubscribe();
        unsub.unsubscribe();
        bus.publish();

        // The surviving listener is untouched by the double call.
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listeners().len(), 1);
    }

    #[test]
    fn unsubscribe_after_bus_drop_is_a_noop() {
        let bus = Bus::new(());
        let unsub = bus.subscribe(|| ());
        drop(bus);
        unsub.unsubscribe();
    }

    #[test]
    fn has_listeners_tracks_registry() {
        let bus = Bus::new(());
        assert!(!bus.has_listeners());

        let unsub = bus.subscribe(|| ());
        assert!(bus.has_listeners());

        unsub.unsubscribe();
        assert!(!bus.has_listeners());
    }

    #[test]
    fn listener_ids_are_unique_and_ordered() {
        let bus = Bus::new(());
        let first = bus.subscribe(|| ());
        let second = bus.subscribe(|| ());

        assert_ne!(first.listener_id(), second.listener_id());
        assert_eq!(
            bus.listeners(),
            vec![first.listener_id(), second.listener_id()]
        );
    }

    #[test]
    fn reentrant_subscribe_during_publish_takes_effect_next_sweep() {
        let bus = Bus::new(());
        let hits = Rc::new(Cell::new(0));

        let inner_bus = bus.clone();
        let inner_hits = Rc::clone(&hits);
        let _unsub = bus.subscribe(move || {
            let h = Rc::clone(&inner_hits);
            let _ = inner_bus.subscribe(move || h.set(h.get() + 1));
        });

        bus.publish();
        // The listener added mid-sweep did not run in that sweep.
        assert_eq!(hits.get(), 0);

        bus.publish();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reentrant_unsubscribe_during_publish_does_not_panic() {
        let bus = Bus::new(());
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&hits);
        let victim = Rc::new(bus.subscribe(move || h.set(h.get() + 1)));

        let victim_for_listener = Rc::clone(&victim);
        let _unsub = bus.subscribe(move || victim_for_listener.unsubscribe());

        // Snapshot semantics: the victim still runs in the sweep that
        // removes it (it was subscribed first), but not afterwards.
        bus.publish();
        assert_eq!(hits.get(), 1);

        bus.publish();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn clones_share_the_registry() {
        let bus = Bus::new(());
        let twin = bus.clone();
        let _unsub = bus.subscribe(|| ());
        assert!(twin.has_listeners());
    }

    #[test]
    fn payload_is_shared_and_readable() {
        let bus = Bus::new(String::from("context"));
        let twin = bus.clone();
        assert_eq!(bus.payload(), "context");
        assert_eq!(twin.payload(), "context");
    }
}
