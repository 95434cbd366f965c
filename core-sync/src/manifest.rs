//! # Manifest Model
//!
//! The in-memory SPDX manifest of one project and the settings it is created
//! from.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized → Created ⇄ Synced ⇄ StaleRescanPending
//!       │            │         │              │
//!       └────────────┴─────────┴──────────────┴──→ Disabled
//! ```

use crate::filter::{escape_file_name, FileFilter};
use crate::license::LicenseCatalog;
use crate::record::{FileDefaults, FileRecord};
use crate::verification::{VerificationCode, VerificationCodeCalculator};
use crate::Result;
use bridge_traits::license::{LicenseExpression, NOASSERTION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Suffix of the default backing file name.
pub const SPDX_FILE_SUFFIX: &str = ".spdx";

/// Base of the default document URL.
pub const DEFAULT_DOCUMENT_URL_BASE: &str = "http://spdx.org/spdxdocs/";

pub const DEFAULT_PACKAGE_VERSION: &str = "0.1";

/// Data license every SPDX document is published under.
pub const DATA_LICENSE: &str = "CC0-1.0";

// ============================================================================
// Package & Creator Info
// ============================================================================

/// Package-level fields of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub download_location: String,
    pub declared_license: LicenseExpression,
    pub concluded_license: LicenseExpression,
    pub copyright: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub originator: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_PACKAGE_VERSION.to_string(),
            download_location: NOASSERTION.to_string(),
            declared_license: LicenseExpression::NoAssertion,
            concluded_license: LicenseExpression::NoAssertion,
            copyright: NOASSERTION.to_string(),
            summary: String::new(),
            description: String::new(),
            supplier: String::new(),
            originator: String::new(),
        }
    }
}

/// Who produced the document and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorInfo {
    pub creators: Vec<String>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub reviewer: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
}

// ============================================================================
// Project Settings
// ============================================================================

/// Per-project settings a manifest is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    pub project: String,
    /// Absolute project root on the host file system
    pub root: PathBuf,
    /// Backing file name, relative to `root`
    pub spdx_file_name: String,
    pub document_url: String,
    pub include_directories: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub file_defaults: FileDefaults,
    pub package: PackageInfo,
    pub creators: Vec<String>,
}

impl ProjectSettings {
    /// Settings with the standard defaults: the whole project included, no
    /// exclusions, backing file `<project>.spdx`.
    pub fn new(project: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let project = project.into();
        Self {
            spdx_file_name: format!("{}{}", project, SPDX_FILE_SUFFIX),
            document_url: format!("{}{}", DEFAULT_DOCUMENT_URL_BASE, project),
            include_directories: vec!["/".to_string()],
            exclude_patterns: Vec::new(),
            file_defaults: FileDefaults::default(),
            package: PackageInfo::new(project.clone()),
            creators: Vec::new(),
            root: root.into(),
            project,
        }
    }

    pub fn with_include_directories<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_directories = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_spdx_file_name(mut self, name: impl Into<String>) -> Self {
        self.spdx_file_name = name.into();
        self
    }

    pub fn with_document_url(mut self, url: impl Into<String>) -> Self {
        self.document_url = url.into();
        self
    }

    pub fn with_file_defaults(mut self, defaults: FileDefaults) -> Self {
        self.file_defaults = defaults;
        self
    }

    pub fn with_package(mut self, package: PackageInfo) -> Self {
        self.package = package;
        self
    }

    pub fn with_creators<I, S>(mut self, creators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.creators = creators.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Manifest State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestState {
    /// No manifest document yet
    Uninitialized,
    /// Populated from defaults; initial rescan not finished
    Created,
    /// File set matches the file system
    Synced,
    /// A configuration change or cancelled scan invalidated the file set
    StaleRescanPending,
    /// Explicitly torn down
    Disabled,
}

impl ManifestState {
    /// True when a manifest document exists in memory.
    pub fn has_manifest(&self) -> bool {
        matches!(
            self,
            ManifestState::Created | ManifestState::Synced | ManifestState::StaleRescanPending
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestState::Uninitialized => "uninitialized",
            ManifestState::Created => "created",
            ManifestState::Synced => "synced",
            ManifestState::StaleRescanPending => "stale_rescan_pending",
            ManifestState::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for ManifestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Live manifest of one project.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub document_url: String,
    pub data_license: String,
    pub package: PackageInfo,
    pub creator: CreatorInfo,
    pub reviewers: Vec<Reviewer>,
    pub file_records: HashMap<String, FileRecord>,
    pub license_catalog: LicenseCatalog,
    pub licenses_seen_in_files: BTreeSet<LicenseExpression>,
    pub filter: FileFilter,
    pub file_defaults: FileDefaults,
    pub verification_code: VerificationCode,
    /// Backing file name relative to the project root
    pub spdx_file_name: String,
    pub dirty: bool,
    pub file_rescan_required: bool,
}

impl Manifest {
    /// Fresh manifest from settings. The backing file's own name is added to
    /// the exclude patterns; the file set stays empty until a rescan.
    pub fn from_settings(
        settings: &ProjectSettings,
        standard_license_ids: &[String],
        created: DateTime<Utc>,
    ) -> Result<Self> {
        let filter = FileFilter::new(&settings.include_directories, &settings.exclude_patterns)?
            .with_exclude_pattern(&escape_file_name(&settings.spdx_file_name))?;

        let mut license_catalog = LicenseCatalog::seeded(standard_license_ids.iter().cloned());
        let mut package = settings.package.clone();
        package.declared_license = license_catalog.convert_to_local(Some(&package.declared_license));
        package.concluded_license =
            license_catalog.convert_to_local(Some(&package.concluded_license));
        let mut file_defaults = settings.file_defaults.clone();
        file_defaults.license = license_catalog.convert_to_local(Some(&file_defaults.license));

        let mut manifest = Self {
            document_url: settings.document_url.clone(),
            data_license: DATA_LICENSE.to_string(),
            package,
            creator: CreatorInfo {
                creators: settings.creators.clone(),
                created,
                comment: String::new(),
            },
            reviewers: Vec::new(),
            file_records: HashMap::new(),
            license_catalog,
            licenses_seen_in_files: BTreeSet::new(),
            filter,
            file_defaults,
            verification_code: VerificationCode::default(),
            spdx_file_name: settings.spdx_file_name.clone(),
            dirty: true,
            file_rescan_required: true,
        };
        manifest.recompute_verification_code();
        Ok(manifest)
    }

    /// Paths left out of the verification code: the backing file, when it
    /// has a record.
    pub fn verification_exclusions(&self) -> BTreeSet<String> {
        let mut excluded = BTreeSet::new();
        if self.file_records.contains_key(&self.spdx_file_name) {
            excluded.insert(self.spdx_file_name.clone());
        }
        excluded
    }

    pub fn recompute_verification_code(&mut self) {
        let excluded = self.verification_exclusions();
        self.verification_code =
            VerificationCodeCalculator::compute(self.file_records.values(), &excluded);
    }

    pub fn recompute_seen_licenses(&mut self) {
        self.licenses_seen_in_files = self
            .file_records
            .values()
            .flat_map(|record| record.seen_licenses.iter().cloned())
            .collect();
    }

    /// Sorted project-relative paths of every record.
    pub fn file_references(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.file_records.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{sha1_hex, FileType};
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn record(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            sha1: sha1_hex(path.as_bytes()),
            file_type: FileType::Other,
            seen_licenses: [LicenseExpression::standard("MIT")].into(),
            concluded_license: LicenseExpression::NoAssertion,
            copyright: String::new(),
            notice: String::new(),
            comment: String::new(),
            contributors: Vec::new(),
            artifact_of: Vec::new(),
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ProjectSettings::new("demo", "/work/demo");
        assert_eq!(settings.spdx_file_name, "demo.spdx");
        assert_eq!(settings.document_url, "http://spdx.org/spdxdocs/demo");
        assert_eq!(settings.include_directories, vec!["/"]);
        assert_eq!(settings.package.version, "0.1");
    }

    #[test]
    fn test_from_settings_excludes_backing_file() {
        let settings = ProjectSettings::new("demo", "/work/demo");
        let manifest = Manifest::from_settings(&settings, &["MIT".to_string()], created()).unwrap();

        assert!(!manifest.filter.is_included("demo.spdx"));
        assert!(manifest.filter.is_included("src/a.c"));
        assert!(manifest.dirty);
        assert!(manifest.file_rescan_required);
        assert_eq!(manifest.data_license, DATA_LICENSE);
        assert_eq!(manifest.creator.created, created());
    }

    #[test]
    fn test_from_settings_rejects_bad_pattern() {
        let settings = ProjectSettings::new("demo", "/work/demo").with_exclude_patterns(["("]);
        assert!(Manifest::from_settings(&settings, &[], created()).is_err());
    }

    #[test]
    fn test_backing_file_record_excluded_from_code() {
        let settings = ProjectSettings::new("demo", "/work/demo");
        let mut manifest = Manifest::from_settings(&settings, &[], created()).unwrap();
        manifest.file_records.insert("a.c".into(), record("a.c"));
        manifest.recompute_verification_code();
        let without_backing = manifest.verification_code.value.clone();

        manifest
            .file_records
            .insert("demo.spdx".into(), record("demo.spdx"));
        manifest.recompute_verification_code();

        assert_eq!(manifest.verification_code.value, without_backing);
        assert!(manifest.verification_code.excluded_files.contains("demo.spdx"));
    }

    #[test]
    fn test_recompute_seen_licenses() {
        let settings = ProjectSettings::new("demo", "/work/demo");
        let mut manifest = Manifest::from_settings(&settings, &[], created()).unwrap();
        manifest.file_records.insert("a.c".into(), record("a.c"));
        manifest.recompute_seen_licenses();
        assert_eq!(manifest.licenses_seen_in_files.len(), 1);

        manifest.file_records.clear();
        manifest.recompute_seen_licenses();
        assert!(manifest.licenses_seen_in_files.is_empty());
    }

    #[test]
    fn test_state_has_manifest() {
        assert!(!ManifestState::Uninitialized.has_manifest());
        assert!(ManifestState::StaleRescanPending.has_manifest());
        assert!(!ManifestState::Disabled.has_manifest());
        assert_eq!(ManifestState::Synced.to_string(), "synced");
    }
}
