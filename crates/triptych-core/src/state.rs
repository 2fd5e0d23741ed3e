#![forbid(unsafe_code)]

//! State anchoring: back-references from a caller's transient state to the
//! context it describes and the store that owns it.
//!
//! A state value is caller-defined data plus an [`Anchor`]. The anchor
//! starts unbound; [`Store::new`](crate::store::Store::new) binds it during
//! construction. Navigating through an unbound anchor fails fast with
//! [`StoreError::NotInitialized`] instead of touching placeholder values,
//! and both references are weak — state never keeps its store or context
//! alive, and never controls their lifetimes.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::{SharedContext, WeakContext};
use crate::error::{Result, StoreError};
use crate::merge::Merge;
use crate::store::Push;

/// Navigation core embedded in every state value.
///
/// Holds weak handles to the context and to the owning store's push
/// surface. Rebinding through [`set_context`](Self::set_context) /
/// [`set_owner`](Self::set_owner) is allowed (a store may swap state
/// implementations while preserving its context) and never broadcasts by
/// itself.
pub struct Anchor<R: Merge, M: Merge> {
    context: Option<WeakContext<R, M>>,
    owner: Option<Weak<dyn Push<R, M>>>,
}

impl<R: Merge, M: Merge> Default for Anchor<R, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Merge, M: Merge> Clone for Anchor<R, M> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<R: Merge, M: Merge> fmt::Debug for Anchor<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("context_bound", &self.context.is_some())
            .field("owner_bound", &self.owner.is_some())
            .finish()
    }
}

impl<R: Merge, M: Merge> Anchor<R, M> {
    /// An unbound anchor. Navigation fails until a store binds it.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            context: None,
            owner: None,
        }
    }

    /// Bind both references.
    ///
    /// Intended to be called exactly once, immediately after construction
    /// (the store does this). Calling it again rebinds both references,
    /// equivalent to [`set_context`](Self::set_context) plus
    /// [`set_owner`](Self::set_owner).
    pub fn initialize(&mut self, context: WeakContext<R, M>, owner: Weak<dyn Push<R, M>>) {
        self.context = Some(context);
        self.owner = Some(owner);
    }

    /// Rebind the context reference. Does not broadcast.
    pub fn set_context(&mut self, context: WeakContext<R, M>) {
        self.context = Some(context);
    }

    /// Rebind the owner reference. Does not broadcast.
    pub fn set_owner(&mut self, owner: Weak<dyn Push<R, M>>) {
        self.owner = Some(owner);
    }

    /// Whether both references have been bound.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.context.is_some() && self.owner.is_some()
    }

    /// The context this state describes.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotInitialized`] before binding,
    /// [`StoreError::Detached`] once the context has been dropped.
    pub fn context(&self) -> Result<SharedContext<R, M>> {
        self.context
            .as_ref()
            .ok_or(StoreError::not_initialized("context"))?
            .upgrade()
            .ok_or(StoreError::detached("context"))
    }

    /// The owning store's push surface.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotInitialized`] before binding,
    /// [`StoreError::Detached`] once the store has been dropped.
    pub fn owner(&self) -> Result<Rc<dyn Push<R, M>>> {
        self.owner
            .as_ref()
            .ok_or(StoreError::not_initialized("owner"))?
            .upgrade()
            .ok_or(StoreError::detached("owner"))
    }
}

/// Caller-defined transient state that can be wired into a store.
///
/// Implementors embed an [`Anchor`] field and expose it; the provided
/// methods give navigation back to the context and the owning store.
pub trait State<R: Merge, M: Merge> {
    /// The embedded anchor.
    fn anchor(&self) -> &Anchor<R, M>;

    /// Mutable access to the embedded anchor (the store binds through
    /// this).
    fn anchor_mut(&mut self) -> &mut Anchor<R, M>;

    /// The context this state describes.
    ///
    /// # Errors
    ///
    /// See [`Anchor::context`].
    fn context(&self) -> Result<SharedContext<R, M>> {
        self.anchor().context()
    }

    /// The owning store's push surface.
    ///
    /// # Errors
    ///
    /// See [`Anchor::owner`].
    fn owner(&self) -> Result<Rc<dyn Push<R, M>>> {
        self.anchor().owner()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
