//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature so host applications can depend on
//! `survey-workspace` and get an authenticated survey client wired with the
//! desktop keychain and HTTP adapters without naming each crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
