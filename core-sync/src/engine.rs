//! # Incremental Sync Engine
//!
//! Keeps one project's manifest in step with its file tree.
//!
//! ## Overview
//!
//! The engine owns the live [`Manifest`] and serializes every mutation on it
//! behind a single async mutex:
//! - single-file deltas (`add_file`, `update_file`, `remove_file`) run on the
//!   caller's task
//! - full rescans run on a background task and hold the lock for the whole
//!   walk, so deltas queue behind them instead of interleaving
//! - property changes update configuration and, for include/exclude changes,
//!   schedule a fresh rescan
//!
//! ## Rescans
//!
//! Requesting a rescan while one is in flight cancels the older one first
//! (last writer wins). The walk is staged: records are collected into a new
//! map and swapped into the manifest only when the walk completes. A
//! cancelled or failed walk keeps the previous records and leaves
//! `file_rescan_required` set.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = IncrementalSyncEngine::new(ProjectSettings::new("demo", root), context);
//! engine.open_or_create().await?;
//!
//! engine.add_file("src/new.c").await?;
//! let code = engine.verification_code().await?;
//!
//! engine.set_include_directories(vec!["/".into()]).await?;
//! engine.wait_for_rescan().await?;
//! engine.save().await?;
//! ```

use crate::context::SyncContext;
use crate::filter::{escape_file_name, normalize_path, parse_list, validate_patterns, FileFilter};
use crate::job::{job_channel, Job, JobHandle, JobId, JobKind, RescanOutcome, SaveOutcome};
use crate::license::LicenseCatalog;
use crate::manifest::{Manifest, ManifestState, PackageInfo, ProjectSettings};
use crate::persistence::{LoadedManifest, ManifestDocument};
use crate::record::{cleared_copyright, ArtifactOf, FileDefaults, FileRecord, FileRecordBuilder};
use crate::router::PropertyKey;
use crate::verification::VerificationCode;
use crate::{Result, SyncError};
use bridge_traits::license::{CustomLicense, LicenseExpression};
use core_runtime::events::{CoreEvent, ManifestEvent, PropertyScope, RescanEvent};
use core_runtime::logging::{redact_if_sensitive, strip_path};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Artifact-of name used when only a URL is known.
pub const UNNAMED_ARTIFACT: &str = "TEMPNAME";

/// Result of a single-file delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaEffect {
    /// The manifest changed
    Applied,
    /// Out of scope or nothing to remove; the manifest is unchanged
    Ignored,
}

/// Result of a property change.
#[derive(Debug)]
pub enum PropertyOutcome {
    /// Old and new values are equal
    Unchanged,
    /// Nothing to update (no record for the file, or wrong scope)
    Ignored,
    Applied,
    /// Configuration updated; a full rescan is running in the background
    RescanScheduled(JobHandle<RescanOutcome>),
}

struct EngineInner {
    state: ManifestState,
    manifest: Option<Manifest>,
}

enum WalkResult {
    Completed(StagedScan),
    Cancelled { files_processed: usize },
}

struct StagedScan {
    records: HashMap<String, FileRecord>,
    catalog: LicenseCatalog,
    package: PackageInfo,
    file_defaults: FileDefaults,
}

/// Manifest owner for one project.
pub struct IncrementalSyncEngine {
    settings: ProjectSettings,
    context: SyncContext,
    builder: FileRecordBuilder,
    inner: Arc<Mutex<EngineInner>>,
    active_rescan: Arc<Mutex<Option<JobHandle<RescanOutcome>>>>,
}

fn require_manifest<'a>(project: &str, inner: &'a mut EngineInner) -> Result<&'a mut Manifest> {
    if inner.state == ManifestState::Disabled {
        return Err(SyncError::Disabled(project.to_string()));
    }
    inner
        .manifest
        .as_mut()
        .ok_or_else(|| SyncError::NotCreated(project.to_string()))
}

impl IncrementalSyncEngine {
    pub fn new(settings: ProjectSettings, context: SyncContext) -> Self {
        let builder = FileRecordBuilder::new(
            Arc::clone(&context.file_system),
            context.license_scanner.clone(),
            Arc::clone(&context.license_parser),
        );
        Self {
            settings,
            context,
            builder,
            inner: Arc::new(Mutex::new(EngineInner {
                state: ManifestState::Uninitialized,
                manifest: None,
            })),
            active_rescan: Arc::new(Mutex::new(None)),
        }
    }

    pub fn project(&self) -> &str {
        &self.settings.project
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Clone for background task (shares state, avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            context: self.context.clone(),
            builder: self.builder.clone(),
            inner: Arc::clone(&self.inner),
            active_rescan: Arc::clone(&self.active_rescan),
        }
    }

    fn emit_manifest(&self, event: ManifestEvent) {
        self.context.emit(CoreEvent::Manifest(event));
    }

    fn emit_rescan(&self, event: RescanEvent) {
        self.context.emit(CoreEvent::Rescan(event));
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        let relative = normalize_path(relative);
        if relative.is_empty() {
            self.settings.root.clone()
        } else {
            self.settings.root.join(relative)
        }
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.settings.root).ok()?;
        let relative = normalize_path(relative.to_str()?);
        (!relative.is_empty()).then_some(relative)
    }

    async fn read<T>(&self, f: impl FnOnce(&Manifest) -> T) -> Result<T> {
        let guard = self.inner.lock().await;
        if guard.state == ManifestState::Disabled {
            return Err(SyncError::Disabled(self.settings.project.clone()));
        }
        guard
            .manifest
            .as_ref()
            .map(f)
            .ok_or_else(|| SyncError::NotCreated(self.settings.project.clone()))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Build a fresh manifest from the settings, run the initial full rescan
    /// and write the backing file.
    ///
    /// The backing file is written only when the rescan completes; otherwise
    /// the manifest stays in memory with a rescan owed.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadyCreated`] when a manifest is loaded or the backing
    /// file already exists.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn create(&self) -> Result<RescanOutcome> {
        let path = self.resolve(&self.settings.spdx_file_name);
        {
            let mut guard = self.inner.lock().await;
            if guard.state == ManifestState::Disabled {
                return Err(SyncError::Disabled(self.settings.project.clone()));
            }
            if guard.manifest.is_some() || self.context.persistence.exists(&path).await? {
                return Err(SyncError::AlreadyCreated(self.settings.project.clone()));
            }

            let manifest = Manifest::from_settings(
                &self.settings,
                &self.context.standard_license_ids,
                self.context.clock.now(),
            )?;
            guard.manifest = Some(manifest);
            guard.state = ManifestState::Created;
        }

        let shown = path.display().to_string();
        info!(file = %strip_path(&shown), "Created manifest");
        self.emit_manifest(ManifestEvent::Created {
            project: self.settings.project.clone(),
            path: path.display().to_string(),
        });

        let outcome = self.refresh("initial scan").await?;
        if outcome.is_completed() {
            self.save().await?;
        }
        Ok(outcome)
    }

    /// Load the existing backing file. Returns the verification warnings;
    /// they never fail the load.
    ///
    /// Opening an already loaded manifest is a no-op.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn open(&self) -> Result<Vec<String>> {
        let mut guard = self.inner.lock().await;
        if guard.state == ManifestState::Disabled {
            return Err(SyncError::Disabled(self.settings.project.clone()));
        }
        if guard.manifest.is_some() {
            return Ok(Vec::new());
        }

        let path = self.resolve(&self.settings.spdx_file_name);
        let LoadedManifest { document, warnings } = self.context.persistence.load(&path).await?;
        let manifest = document.into_manifest()?;
        let files = manifest.file_records.len();
        let document_url = redact_if_sensitive("document_url", &manifest.document_url);

        guard.state = if manifest.file_rescan_required {
            ManifestState::StaleRescanPending
        } else {
            ManifestState::Synced
        };
        guard.manifest = Some(manifest);
        drop(guard);

        info!(files, warnings = warnings.len(), document_url = %document_url, "Opened manifest");
        self.emit_manifest(ManifestEvent::Opened {
            project: self.settings.project.clone(),
            files: files as u64,
        });
        if !warnings.is_empty() {
            self.emit_manifest(ManifestEvent::VerificationWarnings {
                project: self.settings.project.clone(),
                warnings: warnings.clone(),
            });
        }
        Ok(warnings)
    }

    /// Open the backing file if it exists, otherwise create it.
    pub async fn open_or_create(&self) -> Result<()> {
        let path = self.resolve(&self.settings.spdx_file_name);
        if self.context.persistence.exists(&path).await? {
            self.open().await.map(|_| ())
        } else {
            self.create().await.map(|_| ())
        }
    }

    /// Stop any rescan, drop the in-memory manifest and refuse further work.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn disable(&self) -> Result<()> {
        let active = self.active_rescan.lock().await.take();
        if let Some(handle) = active {
            handle.cancel();
            if let Err(e) = handle.join().await {
                warn!(error = %e, "Rescan ended abnormally during disable");
            }
        }

        {
            let mut guard = self.inner.lock().await;
            guard.manifest = None;
            guard.state = ManifestState::Disabled;
        }

        info!("Disabled manifest");
        self.emit_manifest(ManifestEvent::Disabled {
            project: self.settings.project.clone(),
        });
        Ok(())
    }

    pub async fn state(&self) -> ManifestState {
        self.inner.lock().await.state
    }

    pub async fn is_created(&self) -> bool {
        self.state().await.has_manifest()
    }

    // ========================================================================
    // Full Rescan
    // ========================================================================

    /// Start a background full rescan, cancelling any rescan in flight.
    ///
    /// The new walk starts only after the superseded one has stopped, so a
    /// stale walk never overwrites a fresher one.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn start_full_rescan(&self, reason: &str) -> Result<JobHandle<RescanOutcome>> {
        self.read(|_| ()).await?;

        let job = Job::new(JobKind::FullRescan, self.settings.project.clone(), reason);
        let (handle, completer) = job_channel(job.id, JobKind::FullRescan);

        let previous = self.active_rescan.lock().await.replace(handle.clone());
        if let Some(previous) = &previous {
            debug!(superseded = %previous.id(), "Cancelling in-flight rescan");
            previous.cancel();
        }

        let engine = self.clone_for_task();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.join().await;
            }

            let outcome = engine.run_full_rescan(job, task_handle.token()).await;

            {
                let mut active = engine.active_rescan.lock().await;
                if active.as_ref().map(|h| h.id()) == Some(task_handle.id()) {
                    *active = None;
                }
            }
            completer.finish(outcome);
        });

        Ok(handle)
    }

    /// Run a full rescan and wait for it.
    pub async fn refresh(&self, reason: &str) -> Result<RescanOutcome> {
        self.start_full_rescan(reason).await?.join().await
    }

    /// Block until the in-flight rescan, if any, finishes.
    pub async fn wait_for_rescan(&self) -> Result<Option<RescanOutcome>> {
        let active = self.active_rescan.lock().await.clone();
        match active {
            Some(handle) => handle.join().await.map(Some),
            None => Ok(None),
        }
    }

    /// Cancel the in-flight rescan, if any, without waiting.
    pub async fn cancel_rescan(&self) {
        if let Some(handle) = self.active_rescan.lock().await.as_ref() {
            handle.cancel();
        }
    }

    pub async fn is_rescan_running(&self) -> bool {
        self.active_rescan.lock().await.is_some()
    }

    #[instrument(skip(self, job, token), fields(project = %self.settings.project, job_id = %job.id))]
    async fn run_full_rescan(&self, job: Job, token: CancellationToken) -> RescanOutcome {
        let project = self.settings.project.clone();
        let job_id = job.id.to_string();
        let started = Instant::now();

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        self.emit_rescan(RescanEvent::Started {
            project: project.clone(),
            job_id: job_id.clone(),
            reason: job.reason.clone(),
        });

        let manifest = match require_manifest(&project, inner) {
            Ok(manifest) => manifest,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Rescan skipped");
                self.emit_rescan(RescanEvent::Failed {
                    project,
                    job_id,
                    message: message.clone(),
                });
                return RescanOutcome::Failed { message };
            }
        };

        let mut job = match job.start() {
            Ok(job) => job,
            Err(e) => return RescanOutcome::Failed { message: e.to_string() },
        };

        let walk = if token.is_cancelled() {
            Ok(WalkResult::Cancelled { files_processed: 0 })
        } else {
            self.walk(manifest, &token, &mut job).await
        };

        match walk {
            Ok(WalkResult::Completed(staged)) => {
                manifest.file_records = staged.records;
                manifest.license_catalog = staged.catalog;
                manifest.package = staged.package;
                manifest.file_defaults = staged.file_defaults;
                manifest.recompute_seen_licenses();
                manifest.recompute_verification_code();
                manifest.file_rescan_required = false;
                manifest.dirty = true;

                let files = manifest.file_records.len();
                let verification_code = manifest.verification_code.value.clone();
                inner.state = ManifestState::Synced;
                drop(guard);

                let _ = job.complete();
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(files, duration_ms, "Full rescan completed");
                self.emit_rescan(RescanEvent::Completed {
                    project,
                    job_id,
                    files: files as u64,
                    verification_code: verification_code.clone(),
                    duration_ms,
                });
                RescanOutcome::Completed {
                    files,
                    verification_code,
                }
            }
            Ok(WalkResult::Cancelled { files_processed }) => {
                manifest.file_rescan_required = true;
                inner.state = ManifestState::StaleRescanPending;
                drop(guard);

                let _ = job.cancel();
                info!(files_processed, "Full rescan cancelled; previous file set kept");
                self.emit_rescan(RescanEvent::Cancelled {
                    project,
                    job_id,
                    files_processed: files_processed as u64,
                });
                RescanOutcome::Cancelled { files_processed }
            }
            Err(e) => {
                manifest.file_rescan_required = true;
                inner.state = ManifestState::StaleRescanPending;
                drop(guard);

                let message = e.to_string();
                let _ = job.fail(message.clone());
                error!(error = %message, "Full rescan failed; previous file set kept");
                self.emit_rescan(RescanEvent::Failed {
                    project,
                    job_id,
                    message: message.clone(),
                });
                RescanOutcome::Failed { message }
            }
        }
    }

    /// Walk the included directories into a staged record set. Cancellation
    /// is polled between entries.
    async fn walk(
        &self,
        manifest: &Manifest,
        token: &CancellationToken,
        job: &mut Job,
    ) -> Result<WalkResult> {
        let fs = &self.context.file_system;
        let filter = &manifest.filter;

        let mut catalog = LicenseCatalog::seeded(self.context.standard_license_ids.iter().cloned());
        let mut package = manifest.package.clone();
        package.declared_license = catalog.convert_to_local(Some(&manifest.package.declared_license));
        package.concluded_license =
            catalog.convert_to_local(Some(&manifest.package.concluded_license));
        let mut file_defaults = manifest.file_defaults.clone();
        file_defaults.license = catalog.convert_to_local(Some(&manifest.file_defaults.license));

        let mut pending = Vec::new();
        for dir in filter.include_directories() {
            let folder = self.resolve(dir);
            if fs
                .exists(&folder)
                .await
                .map_err(|e| SyncError::io(folder.display(), e))?
            {
                pending.push(folder);
            } else {
                debug!(dir = %dir, "Included directory does not exist");
            }
        }

        let mut records = HashMap::new();
        while let Some(folder) = pending.pop() {
            if token.is_cancelled() {
                return Ok(WalkResult::Cancelled {
                    files_processed: records.len(),
                });
            }

            let entries = fs
                .list_directory(&folder)
                .await
                .map_err(|e| SyncError::io(folder.display(), e))?;

            for entry in entries {
                if token.is_cancelled() {
                    return Ok(WalkResult::Cancelled {
                        files_processed: records.len(),
                    });
                }

                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if filter.is_name_excluded(name) {
                    continue;
                }

                let metadata = fs
                    .metadata(&entry)
                    .await
                    .map_err(|e| SyncError::io(entry.display(), e))?;
                if metadata.is_directory {
                    // Linked directories are not followed; a link back up
                    // the tree would never end.
                    if metadata.is_symlink {
                        debug!(dir = %entry.display(), "Skipping symlinked directory");
                    } else {
                        pending.push(entry);
                    }
                    continue;
                }

                let Some(relative) = self.relative_path(&entry) else {
                    continue;
                };
                if records.contains_key(&relative) || !filter.is_included(&relative) {
                    continue;
                }

                let mut record = self
                    .builder
                    .build(&self.settings.root, &relative, &file_defaults)
                    .await?;
                if let Some(previous) = manifest.file_records.get(&relative) {
                    record.apply_overrides(previous.overrides());
                }
                localize_record(&mut catalog, &mut record);
                records.insert(relative, record);
                let _ = job.record_progress(records.len() as u64);
            }
        }

        Ok(WalkResult::Completed(StagedScan {
            records,
            catalog,
            package,
            file_defaults,
        }))
    }

    // ========================================================================
    // Single-File Deltas
    // ========================================================================

    /// Add a record for a file that entered scope.
    ///
    /// # Errors
    ///
    /// [`SyncError::DuplicateFile`] when the path already has a record;
    /// [`SyncError::Io`] when the file cannot be read. Neither mutates the
    /// manifest.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn add_file(&self, path: &str) -> Result<DeltaEffect> {
        let path = normalize_path(path);
        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;

        if !manifest.filter.is_included(&path) {
            debug!(path = %path, "Ignoring add outside scope");
            return Ok(DeltaEffect::Ignored);
        }
        if manifest.file_records.contains_key(&path) {
            return Err(SyncError::DuplicateFile(path));
        }

        let mut record = self
            .builder
            .build(&self.settings.root, &path, &manifest.file_defaults)
            .await?;
        localize_record(&mut manifest.license_catalog, &mut record);
        manifest
            .licenses_seen_in_files
            .extend(record.seen_licenses.iter().cloned());
        manifest.file_records.insert(path.clone(), record);
        manifest.recompute_verification_code();
        manifest.dirty = true;
        drop(guard);

        debug!(path = %path, "Added file");
        self.emit_manifest(ManifestEvent::FileAdded {
            project: self.settings.project.clone(),
            path,
        });
        Ok(DeltaEffect::Applied)
    }

    /// Rebuild the content-derived fields of an existing record. User
    /// annotations on the record are kept.
    ///
    /// # Errors
    ///
    /// [`SyncError::MissingFile`] when the path has no record.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn update_file(&self, path: &str) -> Result<DeltaEffect> {
        let path = normalize_path(path);
        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;

        if !manifest.filter.is_included(&path) {
            debug!(path = %path, "Ignoring update outside scope");
            return Ok(DeltaEffect::Ignored);
        }
        let overrides = manifest
            .file_records
            .get(&path)
            .map(FileRecord::overrides)
            .ok_or_else(|| SyncError::MissingFile(path.clone()))?;

        let mut record = self
            .builder
            .build(&self.settings.root, &path, &manifest.file_defaults)
            .await?;
        record.apply_overrides(overrides);
        localize_record(&mut manifest.license_catalog, &mut record);
        manifest.file_records.insert(path.clone(), record);
        manifest.recompute_seen_licenses();
        manifest.recompute_verification_code();
        manifest.dirty = true;
        drop(guard);

        debug!(path = %path, "Updated file");
        self.emit_manifest(ManifestEvent::FileUpdated {
            project: self.settings.project.clone(),
            path,
        });
        Ok(DeltaEffect::Applied)
    }

    /// Drop a record. Removing an unknown path is a no-op.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn remove_file(&self, path: &str) -> Result<DeltaEffect> {
        let path = normalize_path(path);
        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;

        if manifest.file_records.remove(&path).is_none() {
            return Ok(DeltaEffect::Ignored);
        }
        manifest.recompute_seen_licenses();
        manifest.recompute_verification_code();
        manifest.dirty = true;
        drop(guard);

        debug!(path = %path, "Removed file");
        self.emit_manifest(ManifestEvent::FileRemoved {
            project: self.settings.project.clone(),
            path,
        });
        Ok(DeltaEffect::Applied)
    }

    /// Record that a full rescan is owed without starting one.
    pub async fn mark_rescan_required(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        manifest.file_rescan_required = true;
        guard.state = ManifestState::StaleRescanPending;
        Ok(())
    }

    // ========================================================================
    // Property Changes
    // ========================================================================

    /// Apply one property change. Equal old and new values are a no-op.
    #[instrument(skip(self, old_value, new_value), fields(project = %self.settings.project, key = %key))]
    pub async fn property_changed(
        &self,
        scope: &PropertyScope,
        key: PropertyKey,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<PropertyOutcome> {
        if old_value == new_value {
            return Ok(PropertyOutcome::Unchanged);
        }

        if key.is_file_scoped() {
            let PropertyScope::File { path } = scope else {
                debug!("File property changed at project scope; ignoring");
                return Ok(PropertyOutcome::Ignored);
            };
            return self
                .update_file_property(path, key, old_value, new_value)
                .await;
        }

        if key.is_structural() {
            let values = parse_list(new_value.unwrap_or_default());
            return match key {
                PropertyKey::ExcludedFilePatterns => self.set_exclude_patterns(values).await,
                _ => self.set_include_directories(values).await,
            };
        }

        match key {
            PropertyKey::SpdxFileName => self
                .rename_backing_file(new_value.unwrap_or_default())
                .await
                .map(|_| PropertyOutcome::Applied),
            PropertyKey::SpdxDocUrl => {
                error!("Changing the document URL of an existing manifest is not supported");
                Err(SyncError::UnsupportedProperty(key.as_str().to_string()))
            }
            _ => self.update_file_defaults(key, new_value).await,
        }
    }

    /// Replace the exclude patterns and schedule a full rescan. The backing
    /// file's own pattern is always kept.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidPattern`]; the previous filter stays in force.
    pub async fn set_exclude_patterns(&self, patterns: Vec<String>) -> Result<PropertyOutcome> {
        // Reject before touching the rescan in flight.
        validate_patterns(&patterns)?;
        self.cancel_rescan().await;
        {
            let mut guard = self.inner.lock().await;
            let manifest = require_manifest(&self.settings.project, &mut guard)?;
            let filter = FileFilter::new(manifest.filter.include_directories(), &patterns)?
                .with_exclude_pattern(&escape_file_name(&manifest.spdx_file_name))?;
            manifest.filter = filter;
            manifest.file_rescan_required = true;
            manifest.dirty = true;
            guard.state = ManifestState::StaleRescanPending;
        }

        let handle = self.start_full_rescan("exclude patterns changed").await?;
        Ok(PropertyOutcome::RescanScheduled(handle))
    }

    /// Replace the included directories and schedule a full rescan.
    pub async fn set_include_directories(
        &self,
        directories: Vec<String>,
    ) -> Result<PropertyOutcome> {
        self.cancel_rescan().await;
        {
            let mut guard = self.inner.lock().await;
            let manifest = require_manifest(&self.settings.project, &mut guard)?;
            manifest.filter = FileFilter::new(&directories, manifest.filter.exclude_patterns())?;
            manifest.file_rescan_required = true;
            manifest.dirty = true;
            guard.state = ManifestState::StaleRescanPending;
        }

        let handle = self
            .start_full_rescan("included directories changed")
            .await?;
        Ok(PropertyOutcome::RescanScheduled(handle))
    }

    /// Move the backing file and point the manifest at its new name.
    ///
    /// # Errors
    ///
    /// [`SyncError::RenameTargetExists`] when a file already has the new
    /// name; [`SyncError::Io`] when the host move fails. Configuration is
    /// unchanged in both cases.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn rename_backing_file(&self, new_name: &str) -> Result<()> {
        let new_name = normalize_path(new_name);
        if new_name.is_empty() {
            return Err(SyncError::InvalidFileName(new_name));
        }

        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        let old_name = manifest.spdx_file_name.clone();
        if old_name == new_name {
            return Ok(());
        }

        let fs = &self.context.file_system;
        let old_path = self.resolve(&old_name);
        let new_path = self.resolve(&new_name);
        if fs
            .exists(&old_path)
            .await
            .map_err(|e| SyncError::io(&old_name, e))?
        {
            if fs
                .exists(&new_path)
                .await
                .map_err(|e| SyncError::io(&new_name, e))?
            {
                return Err(SyncError::RenameTargetExists(new_name));
            }
            fs.rename(&old_path, &new_path)
                .await
                .map_err(|e| SyncError::io(&old_name, e))?;
        }

        manifest.filter = manifest
            .filter
            .without_exclude_pattern(&escape_file_name(&old_name))
            .with_exclude_pattern(&escape_file_name(&new_name))?;
        manifest.spdx_file_name = new_name.clone();
        manifest.recompute_verification_code();
        manifest.dirty = true;

        info!(from = %old_name, to = %new_name, "Renamed manifest file");
        Ok(())
    }

    fn parse_license(&self, value: Option<&str>) -> Result<LicenseExpression> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(LicenseExpression::NoAssertion),
            Some(text) => self.context.license_parser.parse(text).map_err(|e| {
                SyncError::InvalidLicenseExpression {
                    expression: text.to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }

    async fn update_file_defaults(
        &self,
        key: PropertyKey,
        new_value: Option<&str>,
    ) -> Result<PropertyOutcome> {
        let license = match key {
            PropertyKey::DefaultFileLicense => Some(self.parse_license(new_value)?),
            _ => None,
        };

        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        let value = new_value.unwrap_or_default();
        match key {
            PropertyKey::DefaultFileLicense => {
                manifest.file_defaults.license =
                    manifest.license_catalog.convert_to_local(license.as_ref());
            }
            PropertyKey::DefaultFileCopyright => manifest.file_defaults.copyright = value.to_string(),
            PropertyKey::DefaultFileNotice => manifest.file_defaults.notice = value.to_string(),
            PropertyKey::DefaultFileContributors => {
                manifest.file_defaults.contributors = parse_list(value)
            }
            _ => return Ok(PropertyOutcome::Ignored),
        }
        manifest.dirty = true;
        Ok(PropertyOutcome::Applied)
    }

    /// Apply a per-file annotation change.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidLicenseExpression`] for a concluded license the
    /// parser rejects; the record is left unchanged.
    pub async fn update_file_property(
        &self,
        path: &str,
        key: PropertyKey,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<PropertyOutcome> {
        let path = normalize_path(path);
        let license = match key {
            PropertyKey::FileConcludedLicense => Some(self.parse_license(new_value)?),
            _ => None,
        };

        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        let Some(record) = manifest.file_records.get_mut(&path) else {
            debug!(path = %path, "No record for file property change");
            return Ok(PropertyOutcome::Ignored);
        };

        let value = new_value.unwrap_or_default();
        match key {
            PropertyKey::FileConcludedLicense => {
                record.concluded_license =
                    manifest.license_catalog.convert_to_local(license.as_ref());
            }
            PropertyKey::FileCopyright => {
                record.copyright = new_value
                    .map(str::to_string)
                    .unwrap_or_else(cleared_copyright);
            }
            PropertyKey::FileNotice => record.notice = value.to_string(),
            PropertyKey::FileComment => record.comment = value.to_string(),
            PropertyKey::FileContributors => record.contributors = parse_list(value),
            PropertyKey::FileArtifactOfProject => {
                apply_artifact_of_change(&mut record.artifact_of, ArtifactField::Name, old_value, value)
            }
            PropertyKey::FileArtifactOfUrl => {
                apply_artifact_of_change(&mut record.artifact_of, ArtifactField::Url, old_value, value)
            }
            _ => return Ok(PropertyOutcome::Ignored),
        }
        manifest.dirty = true;
        drop(guard);

        self.emit_manifest(ManifestEvent::FileUpdated {
            project: self.settings.project.clone(),
            path,
        });
        Ok(PropertyOutcome::Applied)
    }

    // ========================================================================
    // Licenses
    // ========================================================================

    /// Register a custom license.
    pub async fn add_license(&self, license: CustomLicense) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        manifest.license_catalog.add_custom(license)?;
        manifest.dirty = true;
        Ok(())
    }

    pub async fn verify_new_license_id(&self, id: &str) -> Result<bool> {
        self.read(|m| m.license_catalog.verify_new_license_id(id)).await
    }

    pub async fn next_available_license_id(&self) -> Result<String> {
        self.read(|m| m.license_catalog.next_available_license_id())
            .await
    }

    pub async fn custom_license_with_text(&self, text: &str) -> Result<Option<CustomLicense>> {
        self.read(|m| m.license_catalog.custom_with_text(text).cloned())
            .await
    }

    pub async fn available_license_names(&self) -> Result<Vec<String>> {
        self.read(|m| m.license_catalog.available_license_names())
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Sorted project-relative paths of every record.
    pub async fn file_references(&self) -> Result<Vec<String>> {
        self.read(Manifest::file_references).await
    }

    pub async fn file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let path = normalize_path(path);
        self.read(|m| m.file_records.get(&path).cloned()).await
    }

    pub async fn has_record(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path);
        self.read(|m| m.file_records.contains_key(&path)).await
    }

    pub async fn verification_code(&self) -> Result<VerificationCode> {
        self.read(|m| m.verification_code.clone()).await
    }

    pub async fn licenses_seen_in_files(&self) -> Result<BTreeSet<LicenseExpression>> {
        self.read(|m| m.licenses_seen_in_files.clone()).await
    }

    pub async fn is_file_rescan_required(&self) -> Result<bool> {
        self.read(|m| m.file_rescan_required).await
    }

    pub async fn is_dirty(&self) -> Result<bool> {
        self.read(|m| m.dirty).await
    }

    /// Absolute path of the backing file.
    pub async fn backing_file_path(&self) -> Result<PathBuf> {
        let name = self.read(|m| m.spdx_file_name.clone()).await?;
        Ok(self.resolve(&name))
    }

    /// Copy of the whole manifest.
    pub async fn snapshot(&self) -> Result<Manifest> {
        self.read(Manifest::clone).await
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the manifest to its backing file, rescanning first if one is
    /// owed.
    ///
    /// A rescan that is cancelled before the save does not stop it; the
    /// document is written with the rescan flag still set.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn save(&self) -> Result<PathBuf> {
        self.save_to(None).await
    }

    /// Write the manifest to `target` (relative paths are resolved against
    /// the project root). The backing file name is unchanged.
    #[instrument(skip(self), fields(project = %self.settings.project))]
    pub async fn save_as(&self, target: &Path) -> Result<PathBuf> {
        let target = if target.is_relative() {
            self.settings.root.join(target)
        } else {
            target.to_path_buf()
        };
        self.save_to(Some(target)).await
    }

    /// Save on a background task.
    pub fn start_save(&self) -> JobHandle<SaveOutcome> {
        let (handle, completer) = job_channel(JobId::new(), JobKind::Save);
        let engine = self.clone_for_task();
        let token = handle.token();

        tokio::spawn(async move {
            let outcome = if token.is_cancelled() {
                SaveOutcome::Cancelled
            } else {
                match engine.save().await {
                    Ok(path) => SaveOutcome::Saved { path },
                    Err(e) => {
                        error!(project = %engine.settings.project, error = %e, "Background save failed");
                        SaveOutcome::Failed {
                            message: e.to_string(),
                        }
                    }
                }
            };
            completer.finish(outcome);
        });

        handle
    }

    async fn save_to(&self, target: Option<PathBuf>) -> Result<PathBuf> {
        if self.is_file_rescan_required().await? {
            match self.refresh("rescan owed before save").await? {
                RescanOutcome::Completed { .. } => {}
                RescanOutcome::Cancelled { .. } => {
                    warn!("Rescan before save was cancelled; saving with rescan still owed")
                }
                RescanOutcome::Failed { message } => {
                    return Err(SyncError::Persistence(format!(
                        "rescan before save failed: {}",
                        message
                    )))
                }
            }
        }

        let mut guard = self.inner.lock().await;
        let manifest = require_manifest(&self.settings.project, &mut guard)?;
        let path = target.unwrap_or_else(|| self.resolve(&manifest.spdx_file_name));

        let document = ManifestDocument::from_manifest(manifest);
        self.context.persistence.save(&document, &path).await?;
        manifest.dirty = false;
        drop(guard);

        self.emit_manifest(ManifestEvent::Saved {
            project: self.settings.project.clone(),
            path: path.display().to_string(),
        });
        Ok(path)
    }
}

impl std::fmt::Debug for IncrementalSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalSyncEngine")
            .field("project", &self.settings.project)
            .field("root", &self.settings.root)
            .finish_non_exhaustive()
    }
}

/// Move every custom license a record mentions into the manifest catalog.
fn localize_record(catalog: &mut LicenseCatalog, record: &mut FileRecord) {
    record.seen_licenses = record
        .seen_licenses
        .iter()
        .map(|license| catalog.convert_to_local(Some(license)))
        .collect();
    record.concluded_license = catalog.convert_to_local(Some(&record.concluded_license));
}

#[derive(Debug, Clone, Copy)]
enum ArtifactField {
    Name,
    Url,
}

impl ArtifactField {
    fn get(self, artifact: &ArtifactOf) -> &str {
        match self {
            ArtifactField::Name => &artifact.name,
            ArtifactField::Url => &artifact.url,
        }
    }

    fn set(self, artifact: &mut ArtifactOf, value: &str) {
        match self {
            ArtifactField::Name => artifact.name = value.to_string(),
            ArtifactField::Url => artifact.url = value.to_string(),
        }
    }

    fn new_artifact(self, value: &str) -> ArtifactOf {
        match self {
            ArtifactField::Name => ArtifactOf::new(value, ""),
            ArtifactField::Url => ArtifactOf::new(UNNAMED_ARTIFACT, value),
        }
    }
}

/// With no entries, create one. With one entry, set it. With several, set
/// the entry whose field equals `old`, or prepend a new entry when none does.
fn apply_artifact_of_change(
    entries: &mut Vec<ArtifactOf>,
    field: ArtifactField,
    old: Option<&str>,
    new: &str,
) {
    match entries.len() {
        0 => entries.push(field.new_artifact(new)),
        1 => field.set(&mut entries[0], new),
        _ => {
            let matched = old.and_then(|old| entries.iter_mut().find(|e| field.get(e) == old));
            match matched {
                Some(entry) => field.set(entry, new),
                None => entries.insert(0, field.new_artifact(new)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{sha1_hex, FileType};

    #[test]
    fn test_artifact_of_created_from_project_name() {
        let mut entries = Vec::new();
        apply_artifact_of_change(&mut entries, ArtifactField::Name, None, "upstream");
        assert_eq!(entries, vec![ArtifactOf::new("upstream", "")]);
    }

    #[test]
    fn test_artifact_of_created_from_url() {
        let mut entries = Vec::new();
        apply_artifact_of_change(&mut entries, ArtifactField::Url, None, "http://up.example");
        assert_eq!(
            entries,
            vec![ArtifactOf::new(UNNAMED_ARTIFACT, "http://up.example")]
        );
    }

    #[test]
    fn test_single_artifact_of_set_directly() {
        let mut entries = vec![ArtifactOf::new("a", "http://a")];
        apply_artifact_of_change(&mut entries, ArtifactField::Url, Some("unrelated"), "http://b");
        assert_eq!(entries, vec![ArtifactOf::new("a", "http://b")]);
    }

    #[test]
    fn test_multiple_artifact_of_url_match_takes_new_value() {
        let mut entries = vec![
            ArtifactOf::new("a", "http://a"),
            ArtifactOf::new("b", "http://b"),
        ];
        apply_artifact_of_change(&mut entries, ArtifactField::Url, Some("http://b"), "http://c");
        assert_eq!(entries[1], ArtifactOf::new("b", "http://c"));
        assert_eq!(entries[0], ArtifactOf::new("a", "http://a"));
    }

    #[test]
    fn test_multiple_artifact_of_without_match_prepends() {
        let mut entries = vec![
            ArtifactOf::new("a", "http://a"),
            ArtifactOf::new("b", "http://b"),
        ];
        apply_artifact_of_change(&mut entries, ArtifactField::Name, Some("zzz"), "c");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ArtifactOf::new("c", ""));
    }

    #[test]
    fn test_localize_record_registers_custom_licenses() {
        let mut catalog = LicenseCatalog::seeded(["MIT"]);
        let mut record = FileRecord {
            path: "a.c".into(),
            sha1: sha1_hex(b"a"),
            file_type: FileType::Source,
            seen_licenses: [LicenseExpression::Custom(CustomLicense::new(
                "LicenseRef-foreign",
                "Some text",
            ))]
            .into(),
            concluded_license: LicenseExpression::Custom(CustomLicense::new(
                "LicenseRef-other",
                "Some  text",
            )),
            copyright: String::new(),
            notice: String::new(),
            comment: String::new(),
            contributors: Vec::new(),
            artifact_of: Vec::new(),
        };

        localize_record(&mut catalog, &mut record);

        assert_eq!(record.concluded_license.to_string(), "LicenseRef-1");
        assert_eq!(catalog.custom_licenses().count(), 1);
    }
}
