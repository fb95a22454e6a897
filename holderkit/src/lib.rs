//! Holder-side credential sessions for wallet applications.
//!
//! Re-exports `holderkit-core`. Native apps link this crate; with the `ffi`
//! feature its UniFFI metadata is what `uniffi-bindgen` reads.

pub use holderkit_core::*;

/// Result type of `HolderKit` operations.
pub type HolderKitResult<T, E = HolderKitError> = std::result::Result<T, E>;
