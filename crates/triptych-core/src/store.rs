#![forbid(unsafe_code)]

//! The store: wiring, push operations, and broadcast.
//!
//! [`Store`] wires a [`Context`] and a caller state together at
//! construction, owns the bus handle, and is the only component that
//! triggers a broadcast. Every push is a shallow merge into exactly one
//! partition followed unconditionally by exactly one broadcast — even when
//! the patch is empty.
//!
//! # Concurrency
//!
//! Single-threaded by construction: the handle is `!Send`/`!Sync`
//! (`Rc`/`RefCell` inside), pushes and broadcasts run synchronously to
//! completion on the calling thread, and every listener has run before
//! `push_to_*` returns. A listener may push again; re-entrant broadcasts
//! are permitted and not deduplicated, so bounding push-from-listener
//! cycles is the caller's responsibility.
//!
//! # Example
//!
//! ```
//! use triptych_core::{Anchor, State, Store};
//!
//! triptych_core::patchable! {
//!     #[derive(Debug, Default)]
//!     pub struct TaskRepo => TaskRepoPatch {
//!         pub revision: u32,
//!     }
//! }
//!
//! triptych_core::patchable! {
//!     #[derive(Debug, Default)]
//!     pub struct TaskView => TaskViewPatch {
//!         pub title: String,
//!     }
//! }
//!
//! triptych_core::patchable! {
//!     #[derive(Default)]
//!     pub struct TaskUi => TaskUiPatch {
//!         pub anchor: Anchor<TaskRepo, TaskView>,
//!         pub expanded: bool,
//!     }
//! }
//!
//! impl State<TaskRepo, TaskView> for TaskUi {
//!     fn anchor(&self) -> &Anchor<TaskRepo, TaskView> {
//!         &self.anchor
//!     }
//!     fn anchor_mut(&mut self) -> &mut Anchor<TaskRepo, TaskView> {
//!         &mut self.anchor
//!     }
//! }
//!
//! let store = Store::new(TaskRepo::default(), TaskView::default(), TaskUi::default());
//!
//! let seen = std::rc::Rc::new(std::cell::Cell::new(0));
//! let in_listener = std::rc::Rc::clone(&seen);
//! let _unsub = store.subscribe(move || in_listener.set(in_listener.get() + 1));
//!
//! store.push_to_model(TaskViewPatch::default().title("Alpha".into()));
//! assert_eq!(seen.get(), 1);
//! store.context().with(|ctx| assert_eq!(ctx.model().title, "Alpha"));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use triptych_bus::{Bus, ListenerId, Unsubscribe};

use crate::context::{Context, SharedContext};
use crate::merge::Merge;
use crate::state::State;

/// Push surface a state anchor navigates back to.
///
/// Deliberately narrower than [`Store`]: only the model and repository
/// partitions are reachable through the back-reference — a state value
/// pushing into itself through its own back-reference would re-enter its
/// own borrow.
pub trait Push<R: Merge, M: Merge> {
    /// Shallow-merge `patch` into the model, then broadcast.
    fn push_to_model(&self, patch: M::Patch);

    /// Shallow-merge `patch` into the repository, then broadcast.
    fn push_to_repository(&self, patch: R::Patch);
}

/// Shared interior: exclusive owner of the context handle, the caller
/// state, and the bus.
struct StoreInner<R, M, S> {
    context: SharedContext<R, M>,
    state: RefCell<S>,
    bus: Bus<SharedContext<R, M>>,
}

impl<R, M, S> StoreInner<R, M, S>
where
    R: Merge,
    M: Merge,
    S: Merge,
{
    fn push_model(&self, patch: M::Patch) {
        trace!("push to model");
        self.context.with_mut(|context| context.model_mut().merge(patch));
        self.broadcast_context_changed();
    }

    fn push_repository(&self, patch: R::Patch) {
        trace!("push to repository");
        self.context
            .with_mut(|context| context.repository_mut().merge(patch));
        self.broadcast_context_changed();
    }

    fn push_state(&self, patch: S::Patch) {
        trace!("push to state");
        self.state.borrow_mut().merge(patch);
        self.broadcast_context_changed();
    }

    fn broadcast_context_changed(&self) {
        self.context.with_mut(Context::bump_change_stamp);
        self.bus.publish();
    }
}

impl<R, M, S> Push<R, M> for StoreInner<R, M, S>
where
    R: Merge,
    M: Merge,
    S: Merge,
{
    fn push_to_model(&self, patch: M::Patch) {
        self.push_model(patch);
    }

    fn push_to_repository(&self, patch: R::Patch) {
        self.push_repository(patch);
    }
}

/// The container orchestrating one repository/model/state triple.
///
/// A cheaply-cloneable handle; clones share the same context, state, and
/// bus. The store has no lifecycle beyond "constructed": disposal is
/// dropping every handle and calling any outstanding [`Unsubscribe`].
pub struct Store<R, M, S> {
    inner: Rc<StoreInner<R, M, S>>,
}

impl<R, M, S> Clone for Store<R, M, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R, M, S> fmt::Debug for Store<R, M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("context", &self.inner.context)
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}

impl<R, M, S> Store<R, M, S>
where
    R: Merge + 'static,
    M: Merge + 'static,
    S: State<R, M> + Merge + 'static,
{
    /// Create a store: bundles `repository` and `model` into a fresh
    /// context, acquires a bus scoped to it, and binds the state's anchor
    /// to the context and to this store's push surface.
    #[must_use]
    pub fn new(repository: R, model: M, state: S) -> Self {
        let context = SharedContext::new(Context::new(repository, model));
        let bus = Bus::new(context.clone());
        let inner = Rc::new(StoreInner {
            context,
            state: RefCell::new(state),
            bus,
        });

        let owner: Rc<dyn Push<R, M>> = inner.clone();
        let owner = Rc::downgrade(&owner);
        inner
            .state
            .borrow_mut()
            .anchor_mut()
            .initialize(inner.context.downgrade(), owner);

        Self { inner }
    }

    /// Handle to the context (repository, model, change stamp).
    #[must_use]
    pub fn context(&self) -> SharedContext<R, M> {
        self.inner.context.clone()
    }

    /// Read access to the state partition.
    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.inner.state.borrow())
    }

    /// Write access to the state partition. Mutating here does not
    /// broadcast; use [`push_to_state`](Self::push_to_state), or follow up
    /// with [`broadcast_context_changed`](Self::broadcast_context_changed).
    pub fn with_state_mut<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        f(&mut self.inner.state.borrow_mut())
    }

    /// Shallow-merge `patch` into the model, then broadcast.
    pub fn push_to_model(&self, patch: M::Patch) {
        self.inner.push_model(patch);
    }

    /// Shallow-merge `patch` into the repository, then broadcast.
    pub fn push_to_repository(&self, patch: R::Patch) {
        self.inner.push_repository(patch);
    }

    /// Shallow-merge `patch` into the state, then broadcast.
    pub fn push_to_state(&self, patch: S::Patch) {
        self.inner.push_state(patch);
    }

    /// Stamp the context as changed, then notify every listener.
    ///
    /// Each call re-stamps and re-notifies; there is no deduplication.
    pub fn broadcast_context_changed(&self) {
        self.inner.broadcast_context_changed();
    }

    /// Register `listener` for change broadcasts.
    ///
    /// Broadcasts carry no payload; re-read [`context`](Self::context) for
    /// the new values. Without at least one listener a store still works,
    /// but nothing observes its changes. A listener that captures a clone
    /// of its own store keeps that store alive for as long as it stays
    /// subscribed; navigate through a state anchor where that matters.
    pub fn subscribe(&self, listener: impl Fn() + 'static) -> Unsubscribe {
        self.inner.bus.subscribe(listener)
    }

    /// Handles of all currently registered listeners.
    #[must_use]
    pub fn broadcast_listeners(&self) -> Vec<ListenerId> {
        self.inner.bus.listeners()
    }

    /// Whether any listener is currently subscribed.
    #[must_use]
    pub fn has_broadcast_listeners(&self) -> bool {
        self.inner.bus.has_listeners()
    }
}

impl<R, M, S> Push<R, M> for Store<R, M, S>
where
    R: Merge + 'static,
    M: Merge + 'static,
    S: State<R, M> + Merge + 'static,
{
    fn push_to_model(&self, patch: M::Patch) {
        self.inner.push_model(patch);
    }

    fn push_to_repository(&self, patch: R::Patch) {
        self.inner.push_repository(patch);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Anchor;
    use std::cell::Cell;

    crate::patchable! {
        #[derive(Debug, Default)]
        struct Repo => RepoPatch {
            revision: u32,
            label: String,
        }
    }

    crate::patchable! {
        #[derive(Debug, Default)]
        struct View => ViewPatch {
            title: String,
            count: u32,
        }
    }

    crate::patchable! {
        #[derive(Default)]
        struct Ui => UiPatch {
            anchor: Anchor<Repo, View>,
            expanded: bool,
        }
    }

    impl State<Repo, View> for Ui {
        fn anchor(&self) -> &Anchor<Repo, View> {
            &self.anchor
        }
        fn anchor_mut(&mut self) -> &mut Anchor<Repo, View> {
            &mut self.anchor
        }
    }

    fn fresh() -> Store<Repo, View, Ui> {
        Store::new(Repo::default(), View::default(), Ui::default())
    }

    fn counting(store: &Store<Repo, View, Ui>) -> (Rc<Cell<u32>>, Unsubscribe) {
        let hits = Rc::new(Cell::new(0));
        let in_listener = Rc::clone(&hits);
        let unsub = store.subscribe(move || in_listener.set(in_listener.get() + 1));
        (hits, unsub)
    }

    #[test]
    fn construction_binds_the_state_anchor() {
        let store = fresh();
        assert!(store.with_state(|state| state.anchor().is_initialized()));
        assert!(store.with_state(|state| state.context().is_ok()));
    }

    #[test]
    fn push_to_model_merges_and_broadcasts_once() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        store.push_to_model(ViewPatch::default().title("Alpha".into()));

        assert_eq!(hits.get(), 1);
        store.context().with(|context| {
            assert_eq!(context.model().title, "Alpha");
            assert_eq!(context.model().count, 0);
        });
    }

    #[test]
    fn push_to_repository_merges_and_broadcasts_once() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        store.push_to_repository(RepoPatch::default().revision(3));

        assert_eq!(hits.get(), 1);
        store.context().with(|context| {
            assert_eq!(context.repository().revision, 3);
            assert_eq!(context.repository().label, "");
        });
    }

    #[test]
    fn push_to_state_merges_and_broadcasts_once() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        store.push_to_state(UiPatch::default().expanded(true));

        assert_eq!(hits.get(), 1);
        assert!(store.with_state(|state| state.expanded));
        // The patch left the anchor alone.
        assert!(store.with_state(|state| state.anchor().is_initialized()));
    }

    #[test]
    fn empty_patch_still_broadcasts() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        store.push_to_model(ViewPatch::default());

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn every_push_advances_the_change_stamp() {
        let store = fresh();
        assert_eq!(store.context().change_stamp(), 0);

        store.push_to_model(ViewPatch::default().count(1));
        let first = store.context().change_stamp();
        assert!(first > 0);

        store.push_to_repository(RepoPatch::default().revision(1));
        // Same-millisecond pushes may tie; the stamp never goes backwards.
        assert!(store.context().change_stamp() >= first);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = fresh();
        let (hits, unsub) = counting(&store);

        store.push_to_model(ViewPatch::default());
        unsub.unsubscribe();
        store.push_to_model(ViewPatch::default());
        unsub.unsubscribe();

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_queries_track_subscriptions() {
        let store = fresh();
        assert!(!store.has_broadcast_listeners());
        assert!(store.broadcast_listeners().is_empty());

        let unsub = store.subscribe(|| ());
        assert!(store.has_broadcast_listeners());
        assert_eq!(store.broadcast_listeners(), vec![unsub.listener_id()]);
    }

    #[test]
    fn manual_broadcast_restamps_and_notifies() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        store.broadcast_context_changed();
        store.broadcast_context_changed();

        assert_eq!(hits.get(), 2);
        assert!(store.context().change_stamp() > 0);
    }

    #[test]
    fn state_navigates_back_to_its_owner() {
        let store = fresh();
        let (hits, _unsub) = counting(&store);

        let owner = store.with_state(|state| state.owner()).unwrap();
        owner.push_to_model(ViewPatch::default().title("via owner".into()));

        assert_eq!(hits.get(), 1);
        store
            .context()
            .with(|context| assert_eq!(context.model().title, "via owner"));
    }

    #[test]
    fn listener_reads_the_context_it_was_notified_about() {
        let store = fresh();
        let context = store.context();

        let observed = Rc::new(Cell::new(0u32));
        let in_listener = Rc::clone(&observed);
        let _unsub = store.subscribe(move || {
            in_listener.set(context.with(|ctx| ctx.model().count));
        });

        store.push_to_model(ViewPatch::default().count(17));
        assert_eq!(observed.get(), 17);
    }

    #[test]
    fn reentrant_push_from_listener_is_permitted() {
        let store = fresh();
        let hits = Rc::new(Cell::new(0u32));

        let inner_store = store.clone();
        let in_listener = Rc::clone(&hits);
        let _unsub = store.subscribe(move || {
            in_listener.set(in_listener.get() + 1);
            // Push exactly once more from inside the broadcast.
            if in_listener.get() == 1 {
                inner_store.push_to_model(ViewPatch::default().count(2));
            }
        });

        store.push_to_model(ViewPatch::default().count(1));

        assert_eq!(hits.get(), 2);
        store
            .context()
            .with(|context| assert_eq!(context.model().count, 2));
    }

    #[test]
    fn clones_share_one_store() {
        let store = fresh();
        let twin = store.clone();
        let (hits, _unsub) = counting(&store);

        twin.push_to_model(ViewPatch::default());

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn state_detaches_once_every_handle_is_gone() {
        let store = fresh();
        let anchor = store.with_state(|state| state.anchor().clone());
        assert!(anchor.owner().is_ok());

        drop(store);
        assert!(anchor.owner().is_err());
        assert!(anchor.context().is_err());
    }
}
