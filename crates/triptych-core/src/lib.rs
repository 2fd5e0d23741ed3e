#![forbid(unsafe_code)]

//! Core engine of the Triptych state container.
//!
//! A [`Store`] owns one [`Context`] — the persisted **repository**
//! partition and the derived **model** partition, plus a change stamp —
//! and one caller-defined **state** value anchored back to both. Callers
//! mutate through shallow partial updates ("pushes"): every push merges a
//! typed patch into exactly one partition and then broadcasts a
//! zero-payload change notification through the bus, so listeners re-read
//! the context for the new values.
//!
//! Concrete shapes opt in through two declarative macros: [`patchable!`]
//! generates a shape's patch type and [`Merge`] impl, and [`accepts!`]
//! wires up the repository's insert slots.

pub mod context;
pub mod error;
pub mod merge;
pub mod state;
pub mod store;

pub use context::{Accepts, Context, SharedContext, WeakContext};
pub use error::{Result, StoreError};
pub use merge::Merge;
pub use state::{Anchor, State};
pub use store::{Push, Store};

// Bus types that appear in the store's public surface.
pub use triptych_bus::{Bus, ListenerId, Unsubscribe};
