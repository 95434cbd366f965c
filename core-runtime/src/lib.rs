//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the manifest sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync engine and the
//! service facade depend on. It establishes the logging conventions, the
//! capability checks performed at startup and the typed events that carry
//! property changes and rescan progress between components.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
