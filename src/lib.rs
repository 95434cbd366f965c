//! # SPDX Sync
//!
//! Umbrella crate for hosts that want the manifest sync core without wiring
//! the workspace crates one by one. The `desktop-shims` feature (on by
//! default) re-exports `core-service` built with the native file system and
//! the tag scanner; hosts that inject their own bridges depend on
//! `core-service` and `core-sync` directly.

#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap_desktop, CoreError, CoreService, Result};
