//! # Host Bridge Traits
//!
//! Contracts between the manifest sync core and the host it is embedded in.
//!
//! ## Overview
//!
//! The sync core never touches the disk, a license database or a host log
//! directly. Each of those is a capability supplied by the host through one of
//! the traits below, so the same core can run inside an IDE plugin, a CLI or a
//! test harness with in-memory fakes.
//!
//! ## Traits
//!
//! ### I/O
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Project file reads,
//!   directory listing, atomic writes and renames of the backing manifest
//!
//! ### Licensing
//! - [`LicenseScanner`](license::LicenseScanner) - Detects embedded license
//!   tokens, copyright and notice text in file content
//! - [`LicenseExpressionParser`](license::LicenseExpressionParser) - Parses a
//!   license expression string into a [`LicenseExpression`](license::LicenseExpression)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host log
//!
//! ## Fail-Fast Strategy
//!
//! Required capabilities are checked when the core configuration is built.
//! A missing parser or file system produces a `CapabilityMissing` error
//! naming the trait, rather than a failure deep inside a rescan.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the offending path or
//! expression in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the core shares them across
//! background rescan tasks.

pub mod error;
pub mod license;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use license::{
    CustomLicense, LicenseExpression, LicenseExpressionParser, LicenseScanner, ScanReport,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
