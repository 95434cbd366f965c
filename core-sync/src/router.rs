//! # Property Change Router
//!
//! Maps property change events onto engine operations.
//!
//! The router holds no state of its own. Each `PropertyEvent::Changed` is
//! resolved to the registry entry for its project and dispatched to exactly
//! one engine operation. Events for unknown keys and for projects that are
//! not open are dropped; the router never opens a project as a side effect.

use crate::engine::PropertyOutcome;
use crate::registry::ManifestRegistry;
use crate::Result;
use core_runtime::events::{CoreEvent, EventBus, EventStream, PropertyEvent, RecvError};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Property keys understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    ExcludedFilePatterns,
    IncludedResourceDirectories,
    SpdxFileName,
    SpdxDocUrl,
    DefaultFileLicense,
    DefaultFileCopyright,
    DefaultFileNotice,
    DefaultFileContributors,
    FileConcludedLicense,
    FileCopyright,
    FileNotice,
    FileComment,
    FileContributors,
    FileArtifactOfProject,
    FileArtifactOfUrl,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 15] = [
        PropertyKey::ExcludedFilePatterns,
        PropertyKey::IncludedResourceDirectories,
        PropertyKey::SpdxFileName,
        PropertyKey::SpdxDocUrl,
        PropertyKey::DefaultFileLicense,
        PropertyKey::DefaultFileCopyright,
        PropertyKey::DefaultFileNotice,
        PropertyKey::DefaultFileContributors,
        PropertyKey::FileConcludedLicense,
        PropertyKey::FileCopyright,
        PropertyKey::FileNotice,
        PropertyKey::FileComment,
        PropertyKey::FileContributors,
        PropertyKey::FileArtifactOfProject,
        PropertyKey::FileArtifactOfUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKey::ExcludedFilePatterns => "excluded_file_patterns",
            PropertyKey::IncludedResourceDirectories => "included_resource_directories",
            PropertyKey::SpdxFileName => "spdx_file_name",
            PropertyKey::SpdxDocUrl => "spdx_doc_url",
            PropertyKey::DefaultFileLicense => "default_file_license",
            PropertyKey::DefaultFileCopyright => "default_file_copyright",
            PropertyKey::DefaultFileNotice => "default_file_notice",
            PropertyKey::DefaultFileContributors => "default_file_contributors",
            PropertyKey::FileConcludedLicense => "file_concluded_license",
            PropertyKey::FileCopyright => "file_copyright",
            PropertyKey::FileNotice => "file_notice",
            PropertyKey::FileComment => "file_comment",
            PropertyKey::FileContributors => "file_contributors",
            PropertyKey::FileArtifactOfProject => "file_artifact_of_project",
            PropertyKey::FileArtifactOfUrl => "file_artifact_of_url",
        }
    }

    /// Key for `name`, or `None` for keys this version does not know.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// True for keys whose change invalidates the file set.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PropertyKey::ExcludedFilePatterns | PropertyKey::IncludedResourceDirectories
        )
    }

    /// True for keys stored on a single file.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            PropertyKey::FileConcludedLicense
                | PropertyKey::FileCopyright
                | PropertyKey::FileNotice
                | PropertyKey::FileComment
                | PropertyKey::FileContributors
                | PropertyKey::FileArtifactOfProject
                | PropertyKey::FileArtifactOfUrl
        )
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    UnknownKey(String),
    ProjectNotOpen(String),
}

#[derive(Debug)]
pub enum RouteOutcome {
    Dropped(DropReason),
    Dispatched(PropertyOutcome),
}

impl RouteOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, RouteOutcome::Dispatched(_))
    }
}

/// Dispatches property events to the open manifests.
pub struct PropertyChangeRouter {
    registry: Arc<ManifestRegistry>,
}

impl PropertyChangeRouter {
    pub fn new(registry: Arc<ManifestRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ManifestRegistry> {
        &self.registry
    }

    /// Dispatch one event.
    ///
    /// # Errors
    ///
    /// Propagates the engine operation's failure; the event itself is
    /// consumed either way.
    #[instrument(skip(self, event))]
    pub async fn route(&self, event: &PropertyEvent) -> Result<RouteOutcome> {
        let PropertyEvent::Changed {
            project,
            scope,
            key,
            old_value,
            new_value,
        } = event;

        let Some(property) = PropertyKey::parse(key) else {
            debug!(project = %project, key = %key, "Ignoring unknown property key");
            return Ok(RouteOutcome::Dropped(DropReason::UnknownKey(key.clone())));
        };

        let engine = match self.registry.get(project).await {
            Some(engine) if engine.is_created().await => engine,
            _ => {
                debug!(project = %project, key = %key, "Project not open; dropping property change");
                return Ok(RouteOutcome::Dropped(DropReason::ProjectNotOpen(
                    project.clone(),
                )));
            }
        };

        let outcome = engine
            .property_changed(scope, property, old_value.as_deref(), new_value.as_deref())
            .await?;
        Ok(RouteOutcome::Dispatched(outcome))
    }

    /// Pump property events from `bus` until every sender is gone.
    ///
    /// The subscription is taken before the task starts, so events emitted
    /// right after this call are not missed. Failures are logged and the
    /// pump keeps going. When the pump falls behind, every open project is
    /// marked as owing a rescan.
    pub fn spawn(self: Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Property(_)));

        tokio::spawn(async move {
            info!("Property change router started");
            loop {
                match stream.recv().await {
                    Ok(CoreEvent::Property(event)) => {
                        if let Err(e) = self.route(&event).await {
                            warn!(project = %event_project(&event), error = %e, "Property change failed");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Router fell behind; scheduling rescans for open projects");
                        self.rescan_all("property events missed").await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("Property change router stopped");
        })
    }

    async fn rescan_all(&self, reason: &str) {
        for engine in self.registry.engines().await {
            if !engine.is_created().await {
                continue;
            }
            if let Err(e) = engine.start_full_rescan(reason).await {
                warn!(project = %engine.project(), error = %e, "Could not schedule rescan");
            }
        }
    }
}

impl fmt::Debug for PropertyChangeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyChangeRouter").finish_non_exhaustive()
    }
}

fn event_project(event: &PropertyEvent) -> &str {
    match event {
        PropertyEvent::Changed { project, .. } => project,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_key_round_trip_names() {
        for key in PropertyKey::ALL {
            assert_eq!(PropertyKey::parse(key.as_str()), Some(key));
        }
    }

    #[test]
    fn test_unknown_key_is_none() {
        assert_eq!(PropertyKey::parse("spdx_future_key"), None);
        assert_eq!(PropertyKey::parse(""), None);
    }

    #[test]
    fn test_key_classes() {
        assert!(PropertyKey::ExcludedFilePatterns.is_structural());
        assert!(PropertyKey::IncludedResourceDirectories.is_structural());
        assert!(!PropertyKey::SpdxFileName.is_structural());

        assert!(PropertyKey::FileArtifactOfUrl.is_file_scoped());
        assert!(!PropertyKey::DefaultFileLicense.is_file_scoped());
        assert_eq!(
            PropertyKey::ALL.iter().filter(|k| k.is_file_scoped()).count(),
            7
        );
    }
}
