//! Shared fakes for the core-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::license::{
    CustomLicense, LicenseExpression, LicenseExpressionParser, LicenseScanner, ScanReport,
};
use bridge_traits::storage::{FileMetadata, FileSystemAccess};
use bytes::Bytes;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::{ProjectSettings, SyncContext};
use mockall::mock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

pub const ROOT: &str = "/work/demo";
pub const PROJECT: &str = "demo";

// ============================================================================
// In-memory file system
// ============================================================================

/// File tree held in memory. Directories exist implicitly as ancestors of
/// files.
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, Bytes>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    gate: Mutex<Option<Arc<ListingGate>>>,
}

/// Holds every directory listing until released.
pub struct ListingGate {
    entered: Notify,
    open: Semaphore,
}

impl ListingGate {
    /// Resolves once a listing is waiting at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let every current and future listing through.
    pub fn release(&self) {
        self.open.add_permits(1);
    }
}

impl MemoryFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block directory listings until the returned gate is released.
    pub fn gate_listings(&self) -> Arc<ListingGate> {
        let gate = Arc::new(ListingGate {
            entered: Notify::new(),
            open: Semaphore::new(0),
        });
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Tree under [`ROOT`] from `(relative path, content)` pairs.
    pub fn with_files(files: &[(&str, &str)]) -> Arc<Self> {
        let fs = Self::default();
        for (path, content) in files {
            fs.put(path, content);
        }
        Arc::new(fs)
    }

    pub fn put(&self, relative: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(abs(relative), Bytes::from(content.to_string()));
    }

    pub fn remove(&self, relative: &str) {
        self.files.lock().unwrap().remove(&abs(relative));
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.files.lock().unwrap().contains_key(&abs(relative))
    }

    pub fn content(&self, relative: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(&abs(relative)).cloned()
    }

    /// Make reads of `relative` fail until cleared.
    pub fn make_unreadable(&self, relative: &str) {
        self.unreadable.lock().unwrap().insert(abs(relative));
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .lock()
            .unwrap()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

pub fn abs(relative: &str) -> PathBuf {
    Path::new(ROOT).join(relative)
}

fn missing(path: &Path) -> BridgeError {
    BridgeError::OperationFailed(format!("{} does not exist", path.display()))
}

#[async_trait]
impl FileSystemAccess for MemoryFs {
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path) || self.is_dir(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        if let Some(data) = self.files.lock().unwrap().get(path) {
            return Ok(FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                is_directory: false,
                is_symlink: false,
            });
        }
        if self.is_dir(path) {
            return Ok(FileMetadata {
                size: 0,
                modified_at: None,
                is_directory: true,
                is_symlink: false,
            });
        }
        Err(missing(path))
    }

    async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        if self.unreadable.lock().unwrap().contains(path) {
            return Err(BridgeError::OperationFailed("permission denied".into()));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| missing(path))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.files.lock().unwrap().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        let mut files = self.files.lock().unwrap();
        let data = files.remove(from).ok_or_else(|| missing(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| missing(path))
    }

    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            let _permit = gate.open.acquire().await;
        }

        let files = self.files.lock().unwrap();
        let entries: BTreeSet<PathBuf> = files
            .keys()
            .filter_map(|file| file.strip_prefix(path).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| path.join(first))
            .collect();
        Ok(entries.into_iter().collect())
    }
}

// ============================================================================
// License collaborators
// ============================================================================

/// Accepts `A`, `A AND B` and `A OR B` over ids made of letters, digits,
/// `.`, `-` and `+`. `LicenseRef-*` ids become custom licenses.
pub struct SimpleParser;

fn parse_id(id: &str) -> BridgeResult<LicenseExpression> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
    if !valid {
        return Err(BridgeError::InvalidInput(format!("bad license id '{}'", id)));
    }
    Ok(match id {
        "NOASSERTION" => LicenseExpression::NoAssertion,
        "NONE" => LicenseExpression::None,
        _ if id.starts_with("LicenseRef-") => {
            LicenseExpression::Custom(CustomLicense::new(id, format!("Text of {}", id)))
        }
        _ => LicenseExpression::standard(id),
    })
}

impl LicenseExpressionParser for SimpleParser {
    fn parse(&self, expression: &str) -> BridgeResult<LicenseExpression> {
        let expression = expression.trim();
        if expression.contains(" AND ") {
            return expression
                .split(" AND ")
                .map(parse_id)
                .collect::<BridgeResult<Vec<_>>>()
                .map(LicenseExpression::And);
        }
        if expression.contains(" OR ") {
            return expression
                .split(" OR ")
                .map(parse_id)
                .collect::<BridgeResult<Vec<_>>>()
                .map(LicenseExpression::Or);
        }
        parse_id(expression)
    }
}

mock! {
    pub Scanner {}

    #[async_trait]
    impl LicenseScanner for Scanner {
        async fn scan(&self, path: &Path, content: &[u8]) -> BridgeResult<ScanReport>;
    }
}

/// Report built from `SPDX-License-Identifier:` and `Copyright` lines.
pub fn tag_report(content: &[u8]) -> ScanReport {
    let text = String::from_utf8_lossy(content);
    let mut report = ScanReport::default();
    for line in text.lines() {
        if let Some((_, id)) = line.split_once("SPDX-License-Identifier:") {
            report.license_tokens.push(id.trim().to_string());
        } else if let Some(index) = line.find("Copyright") {
            report.copyright = Some(line[index..].trim().to_string());
        }
    }
    report
}

/// Scanner mock that reads tags from content, any number of times.
pub fn tag_scanner() -> MockScanner {
    let mut scanner = MockScanner::new();
    scanner
        .expect_scan()
        .returning(|_, content| Ok(tag_report(content)));
    scanner
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub fs: Arc<MemoryFs>,
    pub bus: EventBus,
    pub context: SyncContext,
}

pub fn harness(fs: Arc<MemoryFs>, scanner: Option<MockScanner>) -> Harness {
    let mut builder = CoreConfig::builder()
        .file_system(fs.clone())
        .license_parser(Arc::new(SimpleParser))
        .standard_license_ids(["MIT", "Apache-2.0", "GPL-2.0-only", "BSD-3-Clause"]);
    if let Some(scanner) = scanner {
        builder = builder.license_scanner(Arc::new(scanner));
    }
    let config = builder.build().expect("test config");

    let bus = EventBus::new(256);
    let context = SyncContext::from_config(&config).with_event_bus(bus.clone());
    Harness { fs, bus, context }
}

/// The 11-file tree used by the filter scenario.
pub fn scenario_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("src/a.c", "// SPDX-License-Identifier: MIT\nint a;\n"),
        ("src/b.c", "// SPDX-License-Identifier: Apache-2.0\nint b;\n"),
        ("src/notes.skip", "scratch\n"),
        ("src/subdir/c.c", "// Copyright 2024 Example Corp\nint c;\n"),
        ("src/subdir/d.c", "int d;\n"),
        ("src/subdir/old.skip", "scratch\n"),
        ("bin/e.o", "\u{0}\u{1}\u{2}"),
        ("bin/f.o", "\u{0}\u{3}\u{4}"),
        ("root.c", "int main(void) { return 0; }\n"),
        ("README", "Demo project\n"),
        ("Makefile", "all:\n\tcc root.c\n"),
    ]
}

pub fn scenario_excludes() -> Vec<&'static str> {
    vec![".*\\.skip", ".*\\.project", ".*\\.spdx"]
}

/// Settings over [`ROOT`] with the scenario's exclude patterns.
pub fn settings(include: &[&str]) -> ProjectSettings {
    ProjectSettings::new(PROJECT, ROOT)
        .with_include_directories(include.iter().copied())
        .with_exclude_patterns(scenario_excludes())
}
