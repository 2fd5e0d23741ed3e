#![forbid(unsafe_code)]

//! Error taxonomy for the Triptych core.
//!
//! Arbitrary patch values are accepted without validation; the only failure
//! points are state navigation before wiring (or after the owner is gone)
//! and the strict insert mode.

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the Triptych core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A state anchor was asked for its context or owner before
    /// [`initialize`](crate::state::Anchor::initialize) bound it.
    #[error("state not initialized: {role} is unbound")]
    NotInitialized { role: &'static str },

    /// The anchor was bound, but the referenced value has since been
    /// dropped along with its owning store.
    #[error("{role} is gone: the owning store was dropped")]
    Detached { role: &'static str },

    /// Strict insert found no sequence field able to receive the value.
    #[error("repository exposes no insert slot for this value")]
    NoInsertSlot,
}

impl StoreError {
    pub(crate) const fn not_initialized(role: &'static str) -> Self {
        Self::NotInitialized { role }
    }

    pub(crate) const fn detached(role: &'static str) -> Self {
        Self::Detached { role }
    }
}
