//! Time and Logging Abstractions
//!
//! Injectable time source (used to stamp manifest creation) and the sink that
//! mirrors core log events into the host's own log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Time source trait
///
/// Lets tests pin the creation timestamp written into a manifest.
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Structured log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    pub message: String,
    /// Structured fields
    pub fields: HashMap<String, String>,
    /// Name of the enclosing span, if any
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

/// Logger sink trait
///
/// Forwards structured logs from the core to the host log, e.g. the error
/// log view of an IDE. Failed rescans, unsupported property changes and
/// verification warnings on load reach the user through this sink.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    /// Forward a log entry to the host logging system
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Minimum level this sink wants to receive
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Console logger implementation for development
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level < self.min_level {
            return Ok(());
        }
        eprintln!(
            "[{}] {} {}: {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.level.as_str().to_uppercase(),
            entry.target,
            entry.message
        );
        if !entry.fields.is_empty() {
            eprintln!("  Fields: {:?}", entry.fields);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Warn, "core_sync", "verification failed")
            .with_field("project", "demo")
            .with_span("load");

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_sync");
        assert_eq!(entry.fields.get("project"), Some(&"demo".to_string()));
        assert_eq!(entry.span.as_deref(), Some("load"));
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert_eq!(LogLevel::Info.as_str(), "info");
    }

    #[tokio::test]
    async fn test_console_logger_accepts_entries() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Error,
        };
        logger
            .log(LogEntry::new(LogLevel::Info, "test", "filtered"))
            .await
            .unwrap();
        assert_eq!(logger.min_level(), LogLevel::Error);
    }
}
