//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`, with temp-file-then-rename atomic writes
//! - `LicenseScanner` recognising `SPDX-License-Identifier:` tags
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{SpdxTagScanner, TokioFileSystem};
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .license_scanner(Arc::new(SpdxTagScanner::new()?))
//!     .license_parser(parser)
//!     .build()?;
//! ```

mod filesystem;
mod scanner;

pub use filesystem::TokioFileSystem;
pub use scanner::SpdxTagScanner;
