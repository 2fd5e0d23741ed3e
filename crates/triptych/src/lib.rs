#![forbid(unsafe_code)]

//! Triptych public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use triptych_bus as bus;
    pub use triptych_core as core;
}
