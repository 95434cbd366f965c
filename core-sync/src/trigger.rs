//! # Build Triggers
//!
//! Batch entry point for the host's build cycle. A trigger is either a
//! request for a full rescan or an ordered list of file deltas; the engine
//! applies the whole batch, reports every delta's outcome individually and
//! saves when the manifest changed.

use crate::engine::{DeltaEffect, IncrementalSyncEngine};
use crate::filter::normalize_path;
use crate::job::RescanOutcome;
use crate::{Result, SyncError};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
}

/// One file change reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDelta {
    pub path: String,
    pub kind: DeltaKind,
}

impl FileDelta {
    pub fn new(path: impl Into<String>, kind: DeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn added(path: impl Into<String>) -> Self {
        Self::new(path, DeltaKind::Added)
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self::new(path, DeltaKind::Changed)
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self::new(path, DeltaKind::Removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTrigger {
    FullRescanRequested,
    Deltas(Vec<FileDelta>),
}

#[derive(Debug)]
pub struct DeltaResult {
    pub delta: FileDelta,
    pub outcome: Result<DeltaEffect>,
}

/// What one trigger did.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Set when the trigger ran a full rescan instead of the deltas
    pub rescan: Option<RescanOutcome>,
    pub results: Vec<DeltaResult>,
    /// True when the batch stopped early; a rescan is owed
    pub cancelled: bool,
    pub saved: Option<PathBuf>,
    pub save_error: Option<SyncError>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &DeltaResult> {
        self.results.iter().filter(|result| result.outcome.is_err())
    }

    pub fn applied(&self) -> usize {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, Ok(DeltaEffect::Applied)))
            .count()
    }
}

/// Keep only the last delta for each path, at the position of that last
/// occurrence.
pub fn coalesce(deltas: Vec<FileDelta>) -> Vec<FileDelta> {
    let mut last_index = HashMap::new();
    let deltas: Vec<FileDelta> = deltas
        .into_iter()
        .map(|delta| FileDelta {
            path: normalize_path(&delta.path),
            kind: delta.kind,
        })
        .collect();
    for (index, delta) in deltas.iter().enumerate() {
        last_index.insert(delta.path.clone(), index);
    }

    deltas
        .into_iter()
        .enumerate()
        .filter(|(index, delta)| last_index.get(&delta.path) == Some(index))
        .map(|(_, delta)| delta)
        .collect()
}

impl IncrementalSyncEngine {
    /// Apply one build trigger.
    ///
    /// A full rescan runs instead of the deltas when requested or when one
    /// is already owed. Per-delta failures are collected in the report and
    /// do not stop the batch. Cancelling `token` stops the batch between
    /// deltas and marks a rescan as owed.
    ///
    /// # Errors
    ///
    /// Only lifecycle failures (manifest not created or disabled).
    #[instrument(skip(self, trigger, token), fields(project = %self.project()))]
    pub async fn apply_trigger(
        &self,
        trigger: BuildTrigger,
        token: &CancellationToken,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        let rescan_owed = self.is_file_rescan_required().await?;
        let deltas = match trigger {
            BuildTrigger::FullRescanRequested => None,
            BuildTrigger::Deltas(deltas) if rescan_owed => {
                debug!(deltas = deltas.len(), "Rescan owed; replacing deltas with a full rescan");
                None
            }
            BuildTrigger::Deltas(deltas) => Some(deltas),
        };

        if let Some(deltas) = deltas {
            for delta in coalesce(deltas) {
                if token.is_cancelled() {
                    self.mark_rescan_required().await?;
                    report.cancelled = true;
                    break;
                }

                let outcome = self.apply_delta(&delta).await;
                if let Err(e) = &outcome {
                    warn!(path = %delta.path, kind = ?delta.kind, error = %e, "Delta failed");
                }
                report.results.push(DeltaResult { delta, outcome });
            }
        } else {
            let handle = self.start_full_rescan("build trigger").await?;
            let outcome = tokio::select! {
                outcome = handle.join() => outcome?,
                _ = token.cancelled() => {
                    handle.cancel();
                    handle.join().await?
                }
            };
            report.cancelled = !outcome.is_completed();
            report.rescan = Some(outcome);
        }

        if !report.cancelled && self.is_dirty().await? {
            match self.save().await {
                Ok(path) => report.saved = Some(path),
                Err(e) => {
                    warn!(error = %e, "Save after build trigger failed");
                    report.save_error = Some(e);
                }
            }
        }

        info!(
            deltas = report.results.len(),
            applied = report.applied(),
            cancelled = report.cancelled,
            "Build trigger processed"
        );
        Ok(report)
    }

    async fn apply_delta(&self, delta: &FileDelta) -> Result<DeltaEffect> {
        match delta.kind {
            DeltaKind::Added => self.add_file(&delta.path).await,
            DeltaKind::Changed => {
                if self.has_record(&delta.path).await? {
                    self.update_file(&delta.path).await
                } else {
                    debug!(path = %delta.path, "Changed file has no record; adding");
                    self.add_file(&delta.path).await
                }
            }
            DeltaKind::Removed => self.remove_file(&delta.path).await,
        }
    }
}
