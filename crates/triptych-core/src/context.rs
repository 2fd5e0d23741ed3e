#![forbid(unsafe_code)]

//! The context: repository + model + change stamp.
//!
//! [`Context`] bundles the two broadcast-relevant data partitions. The
//! partitions are fixed for the context's lifetime — there is no way to
//! reassign `repository` or `model` wholesale, only to mutate their fields
//! in place (normally through a store's push operations).
//!
//! [`SharedContext`] / [`WeakContext`] are the single-threaded handle pair
//! (`Rc<RefCell<..>>` inside) through which the store, the bus payload, and
//! state anchors all reach the same context.
//!
//! # Invariants
//!
//! 1. `change_stamp` never decreases. Two bumps inside the same wall-clock
//!    millisecond yield an equal stamp — a documented precision limit, not
//!    a violation.
//! 2. `repository` and `model` live exactly as long as the context.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use web_time::SystemTime;

use crate::error::{Result, StoreError};

/// Wall-clock milliseconds since the Unix epoch. A clock before the epoch
/// collapses to 0; `bump_change_stamp` clamps non-decreasing regardless.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Typed insert target: a repository that can receive inserted `T` values
/// names the sequence that holds them.
///
/// Implement by hand when there is a single fixed slot:
///
/// ```
/// use triptych_core::Accepts;
///
/// struct Inbox {
///     messages: Vec<String>,
/// }
///
/// impl Accepts<String> for Inbox {
///     fn slot_mut(&mut self) -> Option<&mut Vec<String>> {
///         Some(&mut self.messages)
///     }
/// }
/// ```
///
/// or through [`accepts!`](crate::accepts) to scan several optional slots
/// in declaration order.
pub trait Accepts<T> {
    /// The sequence that receives inserted values, if one is currently
    /// available.
    fn slot_mut(&mut self) -> Option<&mut Vec<T>>;
}

/// Implement [`Accepts`] by scanning an ordered list of `Option<Vec<_>>`
/// fields; the first field currently `Some` wins.
///
/// This is the compatibility mode for repositories with several candidate
/// sequences: "first available slot in declaration order" is easy to get
/// wrong silently, so prefer a hand-written [`Accepts`] impl naming one
/// slot when you can.
///
/// ```
/// struct Board {
///     archived: Option<Vec<u32>>,
///     active: Option<Vec<u32>>,
/// }
///
/// triptych_core::accepts!(Board => u32: [archived, active]);
///
/// use triptych_core::Accepts;
///
/// let mut board = Board { archived: None, active: Some(Vec::new()) };
/// board.slot_mut().expect("active is available").push(9);
/// assert_eq!(board.active.as_deref(), Some(&[9][..]));
/// ```
#[macro_export]
macro_rules! accepts {
    ($repo:ty => $item:ty : [ $($slot:ident),+ $(,)? ]) => {
        impl $crate::context::Accepts<$item> for $repo {
            fn slot_mut(&mut self) -> ::core::option::Option<&mut ::std::vec::Vec<$item>> {
                $(
                    if let ::core::option::Option::Some(slot) = self.$slot.as_mut() {
                        return ::core::option::Option::Some(slot);
                    }
                )+
                ::core::option::Option::None
            }
        }
    };
}

/// Repository + model + change stamp, owned by one store for its whole
/// lifetime.
#[derive(Debug)]
pub struct Context<R, M> {
    repository: R,
    model: M,
    change_stamp: u64,
}

impl<R, M> Context<R, M> {
    /// Bundle `repository` and `model`; the change stamp starts at 0.
    #[must_use]
    pub fn new(repository: R, model: M) -> Self {
        Self {
            repository,
            model,
            change_stamp: 0,
        }
    }

    /// The persisted partition.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Mutable access to the persisted partition. Mutating here does not
    /// broadcast; pair manual edits with
    /// [`Store::broadcast_context_changed`](crate::store::Store::broadcast_context_changed).
    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    /// The derived partition.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the derived partition.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Milliseconds-since-epoch stamp of the last broadcast change; 0 until
    /// the first bump.
    #[must_use]
    pub fn change_stamp(&self) -> u64 {
        self.change_stamp
    }

    /// Refresh the change stamp to the current wall-clock millisecond,
    /// clamped so the stamp never decreases even if the clock steps
    /// backwards.
    pub fn bump_change_stamp(&mut self) {
        self.change_stamp = now_ms().max(self.change_stamp);
    }

    /// Best-effort insert: append `value` to the repository's available
    /// slot, or silently drop it when no slot is available.
    ///
    /// Convenience, not correctness — with several candidate slots the
    /// first available one wins (see [`accepts!`](crate::accepts)), and a
    /// miss is only a `debug!` log line. Use [`try_insert`](Self::try_insert)
    /// when a dropped value must not go unnoticed.
    pub fn insert<T>(&mut self, value: T)
    where
        R: Accepts<T>,
    {
        if self.try_insert(value).is_err() {
            debug!("insert dropped: repository has no available slot");
        }
    }

    /// Strict insert: errors instead of silently dropping.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoInsertSlot`] when the repository has no available
    /// slot; `value` is consumed either way.
    pub fn try_insert<T>(&mut self, value: T) -> Result<()>
    where
        R: Accepts<T>,
    {
        match self.repository.slot_mut() {
            Some(slot) => {
                slot.push(value);
                Ok(())
            }
            None => Err(StoreError::NoInsertSlot),
        }
    }
}

/// Shared handle to a [`Context`]. Cloning shares the same context.
///
/// Access is closure-scoped; the borrow ends before the closure's result is
/// returned, so handles can be freely stashed in listeners.
pub struct SharedContext<R, M> {
    inner: Rc<RefCell<Context<R, M>>>,
}

impl<R, M> Clone for SharedContext<R, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R, M> fmt::Debug for SharedContext<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(context) => f
                .debug_struct("SharedContext")
                .field("change_stamp", &context.change_stamp())
                .finish_non_exhaustive(),
            Err(_) => f.write_str("SharedContext { <borrowed> }"),
        }
    }
}

impl<R, M> SharedContext<R, M> {
    /// Wrap `context` in a shared handle.
    #[must_use]
    pub fn new(context: Context<R, M>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(context)),
        }
    }

    /// Read access.
    ///
    /// # Panics
    ///
    /// Panics if a `with_mut` borrow on the same context is still active
    /// (re-entrant borrow).
    pub fn with<T>(&self, f: impl FnOnce(&Context<R, M>) -> T) -> T {
        f(&self.inner.borrow())
    }

    /// Write access.
    ///
    /// # Panics
    ///
    /// Panics on re-entrant borrows — e.g. calling `with_mut` from inside
    /// another `with`/`with_mut` closure on the same context.
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut Context<R, M>) -> T) -> T {
        f(&mut self.inner.borrow_mut())
    }

    /// Current change stamp.
    #[must_use]
    pub fn change_stamp(&self) -> u64 {
        self.inner.borrow().change_stamp()
    }

    /// Non-owning handle for navigation; used by state anchors so state
    /// never keeps its context alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakContext<R, M> {
        WeakContext {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning counterpart of [`SharedContext`].
pub struct WeakContext<R, M> {
    inner: Weak<RefCell<Context<R, M>>>,
}

impl<R, M> Clone for WeakContext<R, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<R, M> fmt::Debug for WeakContext<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakContext")
    }
}

impl<R, M> WeakContext<R, M> {
    /// Upgrade to a strong handle, if the context is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<SharedContext<R, M>> {
        self.inner.upgrade().map(|inner| SharedContext { inner })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
