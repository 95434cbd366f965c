//! # Manifest Registry
//!
//! One engine per project name, shared by everything that touches that
//! project. The registry is an explicit service with `open`/`close`
//! lifecycle calls; there is no process-wide instance.

use crate::context::SyncContext;
use crate::engine::IncrementalSyncEngine;
use crate::manifest::{ManifestState, ProjectSettings};
use crate::Result;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Lock-protected map from project name to its engine.
pub struct ManifestRegistry {
    context: SyncContext,
    engines: Mutex<HashMap<String, Arc<IncrementalSyncEngine>>>,
}

impl ManifestRegistry {
    pub fn new(context: SyncContext) -> Self {
        Self {
            context,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Open the project, creating its manifest when no backing file exists.
    ///
    /// Idempotent: an already open project returns its existing engine and
    /// `settings` are ignored. The map lock is never held while a manifest
    /// loads or scans, so other projects stay reachable. When two callers
    /// open the same project at once, the first engine registered wins.
    #[instrument(skip(self, settings), fields(project = %settings.project))]
    pub async fn open(&self, settings: ProjectSettings) -> Result<Arc<IncrementalSyncEngine>> {
        if let Some(engine) = self.live(&settings.project).await {
            return Ok(engine);
        }

        let project = settings.project.clone();
        let engine = Arc::new(IncrementalSyncEngine::new(settings, self.context.clone()));
        engine.open_or_create().await?;

        if let Some(existing) = self.live(&project).await {
            debug!("Project opened concurrently; keeping the registered engine");
            return Ok(existing);
        }
        self.engines
            .lock()
            .await
            .insert(project, Arc::clone(&engine));

        info!("Opened project");
        Ok(engine)
    }

    /// Registered engine for `project` unless it was disabled.
    async fn live(&self, project: &str) -> Option<Arc<IncrementalSyncEngine>> {
        let engine = self.get(project).await?;
        if engine.state().await == ManifestState::Disabled {
            return None;
        }
        Some(engine)
    }

    pub async fn get(&self, project: &str) -> Option<Arc<IncrementalSyncEngine>> {
        self.engines.lock().await.get(project).cloned()
    }

    pub async fn is_open(&self, project: &str) -> bool {
        match self.get(project).await {
            Some(engine) => engine.is_created().await,
            None => false,
        }
    }

    /// Names of the open projects, sorted.
    pub async fn open_projects(&self) -> Vec<String> {
        let mut projects: Vec<String> = self.engines.lock().await.keys().cloned().collect();
        projects.sort();
        projects
    }

    pub(crate) async fn engines(&self) -> Vec<Arc<IncrementalSyncEngine>> {
        self.engines.lock().await.values().cloned().collect()
    }

    /// Wait for the project's rescan, save it when dirty, and forget it.
    ///
    /// Returns `false` when the project was not open.
    #[instrument(skip(self))]
    pub async fn close(&self, project: &str) -> Result<bool> {
        let Some(engine) = self.engines.lock().await.remove(project) else {
            return Ok(false);
        };

        engine.wait_for_rescan().await?;
        if engine.is_created().await && engine.is_dirty().await? {
            engine.save().await?;
        }

        info!("Closed project");
        Ok(true)
    }

    /// Close every project concurrently. All projects are attempted; the
    /// first failure is returned.
    pub async fn close_all(&self) -> Result<()> {
        let projects = self.open_projects().await;
        let results = join_all(projects.iter().map(|project| self.close(project))).await;

        let mut first_error = None;
        for (project, result) in projects.iter().zip(results) {
            if let Err(e) = result {
                warn!(project = %project, error = %e, "Failed to close project");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Disable the project's manifest and forget it without saving.
    #[instrument(skip(self))]
    pub async fn remove(&self, project: &str) -> Result<bool> {
        let Some(engine) = self.engines.lock().await.remove(project) else {
            return Ok(false);
        };
        engine.disable().await?;
        Ok(true)
    }
}

impl std::fmt::Debug for ManifestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestRegistry")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
