#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session orchestration for a credential holder on top of an external
//! credential engine.
//!
//! `holderkit-core` owns the engine lifecycle, turns the engine's callback
//! events into observable state for issuance and presentation, and makes sure
//! every suspended step is resumed exactly once. Formats, cryptography and
//! transports stay inside the engine, reached through the traits in
//! [`engine`].

mod config;
pub use config::*;

mod error;
pub use error::*;

mod kit;
pub use kit::HolderKit;

pub mod bridge;
pub mod defaults;
pub mod documents;
pub mod engine;
pub mod flow_store;
pub mod issuance;
pub mod lifecycle;
pub mod logger;
pub mod paths;
pub mod presentation;
pub mod trigger;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("holderkit_core");
