//! # Manifest Sync Module
//!
//! Keeps a project's SPDX manifest consistent with its file tree.
//!
//! ## Overview
//!
//! This module owns the in-memory manifest of each open project and
//! updates it as the tree and the project configuration change:
//! - Filtering project files by included directories and exclude patterns
//! - Deriving per-file records (content hash, file type, licenses, copyright)
//! - Computing the package verification code
//! - Applying single-file deltas and background full rescans
//! - Routing property change events to the owning manifest
//! - Loading and atomically saving the backing manifest document
//!
//! ## Components
//!
//! - **File Filter** (`filter`): Include/exclude rules with fail-fast pattern compilation
//! - **Record Builder** (`record`): Builds `FileRecord`s from file content and scanner output
//! - **Verification Code** (`verification`): Order-independent digest over record hashes
//! - **License Catalog** (`license`): Standard ids plus locally registered custom licenses
//! - **Sync Engine** (`engine`): Manifest state machine, deltas, rescans, save
//! - **Build Triggers** (`trigger`): Batch delta processing with per-delta outcomes
//! - **Property Router** (`router`): Event-driven dispatch of configuration changes
//! - **Registry** (`registry`): One engine per open project
//! - **Persistence** (`persistence`): Document codec and atomic backing-file writes
//! - **Jobs** (`job`): Background job state machine and cancel/join handles

pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod job;
pub mod license;
pub mod manifest;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod router;
pub mod trigger;
pub mod verification;

pub use context::SyncContext;
pub use engine::{DeltaEffect, IncrementalSyncEngine, PropertyOutcome};
pub use error::{ErrorCategory, Result, SyncError};
pub use filter::FileFilter;
pub use job::{Job, JobHandle, JobId, JobKind, JobStatus, RescanOutcome, SaveOutcome};
pub use license::LicenseCatalog;
pub use manifest::{Manifest, ManifestState, PackageInfo, ProjectSettings};
pub use persistence::{JsonManifestCodec, ManifestCodec, ManifestDocument, PersistenceAdapter};
pub use record::{ArtifactOf, FileDefaults, FileRecord, FileRecordBuilder, FileType};
pub use registry::ManifestRegistry;
pub use router::{DropReason, PropertyChangeRouter, PropertyKey, RouteOutcome};
pub use trigger::{BatchReport, BuildTrigger, DeltaKind, DeltaResult, FileDelta};
pub use verification::{VerificationCode, VerificationCodeCalculator};
