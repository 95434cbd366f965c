//! # Core Configuration Module
//!
//! Provides configuration management for the manifest sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host capabilities and runtime settings. It enforces
//! fail-fast validation so a missing capability is reported at startup rather
//! than in the middle of a rescan.
//!
//! ## Required Dependencies
//!
//! - `LicenseExpressionParser` - Validates concluded-license edits and scanned tokens
//! - `FileSystemAccess` - Project tree access (desktop default: tokio fs)
//!
//! ## Optional Dependencies
//!
//! - `LicenseScanner` - Embedded license detection. Without one, every file
//!   gets the project's default license, copyright and notice.
//! - `LoggerSink` - Host log forwarding
//! - `Clock` - Creation timestamps (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .license_parser(Arc::new(MyParser))
//!     .license_scanner(Arc::new(bridge_desktop::SpdxTagScanner::new()?))
//!     .event_buffer_size(256)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, FileSystemAccess, LicenseExpressionParser, LicenseScanner, LoggerSink, SystemClock,
};
use std::sync::Arc;

use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Standard license ids seeded into every catalog unless overridden.
pub const DEFAULT_STANDARD_LICENSE_IDS: &[&str] = &[
    "0BSD",
    "AFL-3.0",
    "AGPL-3.0",
    "Apache-1.0",
    "Apache-1.1",
    "Apache-2.0",
    "APSL-2.0",
    "Artistic-2.0",
    "BSD-2-Clause",
    "BSD-3-Clause",
    "BSL-1.0",
    "CC0-1.0",
    "CC-BY-4.0",
    "CC-BY-SA-4.0",
    "CDDL-1.0",
    "CPL-1.0",
    "EPL-1.0",
    "EPL-2.0",
    "EUPL-1.2",
    "GPL-2.0",
    "GPL-2.0+",
    "GPL-3.0",
    "GPL-3.0+",
    "ISC",
    "LGPL-2.1",
    "LGPL-2.1+",
    "LGPL-3.0",
    "LGPL-3.0+",
    "MIT",
    "MPL-1.1",
    "MPL-2.0",
    "MS-PL",
    "OFL-1.1",
    "OpenSSL",
    "PHP-3.01",
    "PostgreSQL",
    "Python-2.0",
    "Unlicense",
    "W3C",
    "Zlib",
    "ZPL-2.1",
];

/// Core configuration for the manifest sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// License expression parser (required)
    pub license_parser: Arc<dyn LicenseExpressionParser>,

    /// Embedded license scanner (optional)
    pub license_scanner: Option<Arc<dyn LicenseScanner>>,

    /// Host log forwarding (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Time source for creation timestamps
    pub clock: Arc<dyn Clock>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// Standard license ids seeded into every license catalog
    pub standard_license_ids: Vec<String>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("license_parser", &"LicenseExpressionParser { ... }")
            .field(
                "license_scanner",
                &self.license_scanner.as_ref().map(|_| "LicenseScanner { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("standard_license_ids", &self.standard_license_ids.len())
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Event buffer size is > 0 and at most 65 536
    /// - At least one standard license id is configured, none of them blank
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 65536".to_string(),
            ));
        }

        if self.standard_license_ids.is_empty() {
            return Err(Error::Config(
                "At least one standard license id is required".to_string(),
            ));
        }

        if self
            .standard_license_ids
            .iter()
            .any(|id| id.trim().is_empty())
        {
            return Err(Error::Config(
                "Standard license ids cannot be blank".to_string(),
            ));
        }

        Ok(())
    }
}

fn license_parser_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "LicenseExpressionParser".to_string(),
        message: "A license expression parser is required to validate concluded licenses \
                 and scanned license tokens. Inject the host's SPDX expression library."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required to walk the project tree. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 IDE hosts: inject an adapter over the workspace model."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    file_system: Option<Arc<dyn FileSystemAccess>>,
    license_parser: Option<Arc<dyn LicenseExpressionParser>>,
    license_scanner: Option<Arc<dyn LicenseScanner>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    standard_license_ids: Option<Vec<String>>,
}

impl CoreConfigBuilder {
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn license_parser(mut self, parser: Arc<dyn LicenseExpressionParser>) -> Self {
        self.license_parser = Some(parser);
        self
    }

    pub fn license_scanner(mut self, scanner: Arc<dyn LicenseScanner>) -> Self {
        self.license_scanner = Some(scanner);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Replace the built-in standard license list.
    pub fn standard_license_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.standard_license_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when no parser is injected, or no file system is
    ///   injected and the `desktop-shims` default is unavailable
    /// - `Config` when a setting fails [`CoreConfig::validate`]
    pub fn build(self) -> Result<CoreConfig> {
        let license_parser = self
            .license_parser
            .ok_or_else(license_parser_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            file_system,
            license_parser,
            license_scanner: self.license_scanner,
            logger_sink: self.logger_sink,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            standard_license_ids: self.standard_license_ids.unwrap_or_else(|| {
                DEFAULT_STANDARD_LICENSE_IDS
                    .iter()
                    .map(|id| id.to_string())
                    .collect()
            }),
        };

        config.validate()?;

        Ok(config)
    }
}
