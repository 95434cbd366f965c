//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (file system,
//! license parser, license scanner) into the manifest sync core. It owns the
//! event bus, the registry of open manifests and the property router that
//! listens on the bus. Desktop apps typically enable the `desktop-shims`
//! feature (which depends on `bridge-desktop`) and call
//! [`bootstrap_desktop`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::{Arc, Mutex};

use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, PropertyEvent, PropertyScope};
use core_runtime::logging::LoggingConfig;
use core_sync::{
    IncrementalSyncEngine, ManifestRegistry, ProjectSettings, PropertyChangeRouter, SyncContext,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    registry: Arc<ManifestRegistry>,
    router: Arc<PropertyChangeRouter>,
    router_task: Mutex<Option<JoinHandle<()>>>,
}

impl CoreService {
    /// Build the registry and start the property router.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when called outside a Tokio runtime; the router
    /// pump needs one.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::InitializationFailed(format!("no async runtime: {}", e)))?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let context = SyncContext::from_config(&config).with_event_bus(event_bus.clone());
        let registry = Arc::new(ManifestRegistry::new(context));
        let router = Arc::new(PropertyChangeRouter::new(Arc::clone(&registry)));

        let router_task = {
            let _guard = runtime.enter();
            Arc::clone(&router).spawn(&event_bus)
        };

        info!(
            standard_licenses = config.standard_license_ids.len(),
            scanner = config.license_scanner.is_some(),
            "Core service started"
        );
        Ok(Self {
            config: Arc::new(config),
            event_bus,
            registry,
            router,
            router_task: Mutex::new(Some(router_task)),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Install the global tracing subscriber, forwarding to the configured
    /// host `LoggerSink` unless `logging` already names one.
    ///
    /// # Errors
    ///
    /// `Runtime` when a subscriber is already installed or the filter is
    /// invalid.
    pub fn init_logging(&self, mut logging: LoggingConfig) -> Result<()> {
        if logging.logger_sink.is_none() {
            logging.logger_sink = self.config.logger_sink.clone();
        }
        Ok(core_runtime::logging::init_logging(logging)?)
    }

    pub fn registry(&self) -> &Arc<ManifestRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<PropertyChangeRouter> {
        &self.router
    }

    /// Stream of every core event.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub async fn open_project(&self, settings: ProjectSettings) -> Result<Arc<IncrementalSyncEngine>> {
        Ok(self.registry.open(settings).await?)
    }

    pub async fn close_project(&self, project: &str) -> Result<bool> {
        Ok(self.registry.close(project).await?)
    }

    /// Publish a property change for the router to apply.
    ///
    /// Returns `false` when the router is no longer listening.
    pub fn publish_property_change(
        &self,
        project: impl Into<String>,
        scope: PropertyScope,
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> bool {
        let event = CoreEvent::Property(PropertyEvent::Changed {
            project: project.into(),
            scope,
            key: key.into(),
            old_value,
            new_value,
        });
        self.event_bus.emit(event).is_ok()
    }

    /// Close every project (saving dirty manifests) and stop the router.
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.registry.close_all().await;

        let task = match self.router_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }

        match &result {
            Ok(()) => info!("Core service stopped"),
            Err(e) => warn!(error = %e, "Core service stopped with errors"),
        }
        Ok(result?)
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.router_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

/// Convenience bootstrapper for desktop hosts: `TokioFileSystem`, the
/// `SPDX-License-Identifier` tag scanner and the default license list.
///
/// ```ignore
/// let core = core_service::bootstrap_desktop(Arc::new(MyParser))?;
/// let engine = core.open_project(ProjectSettings::new("demo", "/src/demo")).await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    parser: Arc<dyn bridge_traits::license::LicenseExpressionParser>,
) -> Result<CoreService> {
    use bridge_desktop::{SpdxTagScanner, TokioFileSystem};

    let scanner = SpdxTagScanner::new()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    let config = CoreConfig::builder()
        .file_system(Arc::new(TokioFileSystem::new()))
        .license_parser(parser)
        .license_scanner(Arc::new(scanner))
        .build()?;
    CoreService::new(config)
}
