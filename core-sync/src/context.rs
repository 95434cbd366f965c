use crate::persistence::{ManifestCodec, PersistenceAdapter};
use bridge_traits::license::{LicenseExpressionParser, LicenseScanner};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use std::sync::Arc;

/// Collaborators shared by every manifest engine in a process.
#[derive(Clone)]
pub struct SyncContext {
    pub file_system: Arc<dyn FileSystemAccess>,
    pub license_parser: Arc<dyn LicenseExpressionParser>,
    pub license_scanner: Option<Arc<dyn LicenseScanner>>,
    pub clock: Arc<dyn Clock>,
    pub standard_license_ids: Arc<Vec<String>>,
    pub persistence: PersistenceAdapter,
    pub event_bus: Option<EventBus>,
}

impl SyncContext {
    /// Context backed by the configured collaborators, the JSON codec and no
    /// event bus.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            file_system: Arc::clone(&config.file_system),
            license_parser: Arc::clone(&config.license_parser),
            license_scanner: config.license_scanner.clone(),
            clock: Arc::clone(&config.clock),
            standard_license_ids: Arc::new(config.standard_license_ids.clone()),
            persistence: PersistenceAdapter::new(Arc::clone(&config.file_system)),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ManifestCodec>) -> Self {
        self.persistence = PersistenceAdapter::with_codec(Arc::clone(&self.file_system), codec);
        self
    }

    /// Publish on the bus, if any. Having no subscribers is normal.
    pub(crate) fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("license_scanner", &self.license_scanner.is_some())
            .field("standard_license_ids", &self.standard_license_ids.len())
            .field("event_bus", &self.event_bus)
            .finish_non_exhaustive()
    }
}
