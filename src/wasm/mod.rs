//! WebAssembly bindings for the homebrew machine.
//!
//! This module provides a JavaScript-callable wrapper around [`System`](crate::System)
//! so the machine can run in a browser with a terminal attached to the ACIA.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::HomebrewEmulator;
