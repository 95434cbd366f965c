//! # Manifest Persistence
//!
//! Loads and saves manifests through the host [`FileSystemAccess`].
//!
//! The on-disk body is produced by a [`ManifestCodec`]; the adapter only
//! frames the stream: the whole input is read before decoding, and output is
//! written with [`FileSystemAccess::write_file_atomic`] so a reader never
//! observes a half-written document.
//!
//! Loading runs the codec's semantic verification. Verification problems are
//! returned as warnings; the load itself still succeeds.

use crate::filter::FileFilter;
use crate::license::LicenseCatalog;
use crate::manifest::{CreatorInfo, Manifest, PackageInfo, Reviewer, DATA_LICENSE};
use crate::record::{FileDefaults, FileRecord};
use crate::verification::{VerificationCode, VerificationCodeCalculator};
use crate::{Result, SyncError};
use bridge_traits::license::{CustomLicense, LicenseExpression};
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Version written into every document.
pub const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Document
// ============================================================================

/// Serializable form of a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub format_version: u32,
    pub spdx_file_name: String,
    pub document_url: String,
    pub data_license: String,
    pub package: PackageInfo,
    pub creator: CreatorInfo,
    #[serde(default)]
    pub reviewers: Vec<Reviewer>,
    pub standard_license_ids: Vec<String>,
    #[serde(default)]
    pub extracted_licenses: Vec<CustomLicense>,
    #[serde(default)]
    pub licenses_seen_in_files: BTreeSet<LicenseExpression>,
    pub include_directories: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub file_defaults: FileDefaults,
    pub verification_code: VerificationCode,
    #[serde(default)]
    pub file_rescan_required: bool,
    /// Sorted by path
    pub files: Vec<FileRecord>,
}

impl ManifestDocument {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut files: Vec<FileRecord> = manifest.file_records.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Self {
            format_version: FORMAT_VERSION,
            spdx_file_name: manifest.spdx_file_name.clone(),
            document_url: manifest.document_url.clone(),
            data_license: manifest.data_license.clone(),
            package: manifest.package.clone(),
            creator: manifest.creator.clone(),
            reviewers: manifest.reviewers.clone(),
            standard_license_ids: manifest
                .license_catalog
                .standard_ids()
                .map(str::to_string)
                .collect(),
            extracted_licenses: manifest.license_catalog.custom_licenses().cloned().collect(),
            licenses_seen_in_files: manifest.licenses_seen_in_files.clone(),
            include_directories: manifest.filter.include_directories().to_vec(),
            exclude_patterns: manifest.filter.exclude_patterns().to_vec(),
            file_defaults: manifest.file_defaults.clone(),
            verification_code: manifest.verification_code.clone(),
            file_rescan_required: manifest.file_rescan_required,
            files,
        }
    }

    /// Rebuild the live manifest with a freshly computed verification code.
    /// The result is clean (`dirty == false`).
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidPattern`] for a stored pattern that no longer
    /// compiles, [`SyncError::Persistence`] for conflicting license ids.
    pub fn into_manifest(self) -> Result<Manifest> {
        let filter = FileFilter::new(&self.include_directories, &self.exclude_patterns)?;

        let mut license_catalog = LicenseCatalog::seeded(self.standard_license_ids);
        for license in self.extracted_licenses {
            license_catalog
                .add_custom(license)
                .map_err(|e| SyncError::Persistence(format!("extracted license: {}", e)))?;
        }

        let mut manifest = Manifest {
            document_url: self.document_url,
            data_license: self.data_license,
            package: self.package,
            creator: self.creator,
            reviewers: self.reviewers,
            file_records: self
                .files
                .into_iter()
                .map(|record| (record.path.clone(), record))
                .collect(),
            license_catalog,
            licenses_seen_in_files: self.licenses_seen_in_files,
            filter,
            file_defaults: self.file_defaults,
            verification_code: self.verification_code,
            spdx_file_name: self.spdx_file_name,
            dirty: false,
            file_rescan_required: self.file_rescan_required,
        };
        // A stale stored code is reported by `verify`; the live one always
        // matches the records.
        manifest.recompute_verification_code();
        Ok(manifest)
    }

    /// Semantic checks; every problem found is returned as a warning.
    pub fn verify(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.format_version != FORMAT_VERSION {
            warnings.push(format!(
                "Unsupported format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        if self.data_license != DATA_LICENSE {
            warnings.push(format!(
                "Data license is {} (expected {})",
                self.data_license, DATA_LICENSE
            ));
        }
        if self.spdx_file_name.trim().is_empty() {
            warnings.push("Missing backing file name".to_string());
        }

        for record in &self.files {
            if !is_sha1_hex(&record.sha1) {
                warnings.push(format!("File {}: invalid SHA-1 '{}'", record.path, record.sha1));
            }
        }

        let mut excluded = BTreeSet::new();
        if self.files.iter().any(|r| r.path == self.spdx_file_name) {
            excluded.insert(self.spdx_file_name.clone());
        }
        let expected = VerificationCodeCalculator::compute(&self.files, &excluded);
        if expected.value != self.verification_code.value {
            warnings.push(format!(
                "Verification code {} does not match file records (expected {})",
                self.verification_code.value, expected.value
            ));
        }

        let mut catalog = LicenseCatalog::seeded(self.standard_license_ids.iter().cloned());
        for license in &self.extracted_licenses {
            if let Err(e) = catalog.add_custom(license.clone()) {
                warnings.push(format!("Extracted license: {}", e));
            }
        }
        let mut check = |owner: &str, expression: &LicenseExpression| {
            for id in catalog.unknown_ids(expression) {
                warnings.push(format!("{}: unknown license id {}", owner, id));
            }
        };
        check("Package declared license", &self.package.declared_license);
        check("Package concluded license", &self.package.concluded_license);
        check("Default file license", &self.file_defaults.license);
        for record in &self.files {
            check(record.path.as_str(), &record.concluded_license);
            for seen in &record.seen_licenses {
                check(record.path.as_str(), seen);
            }
        }

        warnings
    }
}

fn is_sha1_hex(value: &str) -> bool {
    value.len() == 40
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

// ============================================================================
// Codec
// ============================================================================

/// Document body format.
pub trait ManifestCodec: Send + Sync {
    fn encode(&self, document: &ManifestDocument) -> Result<Bytes>;

    fn decode(&self, data: &[u8]) -> Result<ManifestDocument>;

    fn verify(&self, document: &ManifestDocument) -> Vec<String> {
        document.verify()
    }
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonManifestCodec;

impl ManifestCodec for JsonManifestCodec {
    fn encode(&self, document: &ManifestDocument) -> Result<Bytes> {
        serde_json::to_vec_pretty(document)
            .map(Bytes::from)
            .map_err(|e| SyncError::Persistence(format!("encode: {}", e)))
    }

    fn decode(&self, data: &[u8]) -> Result<ManifestDocument> {
        serde_json::from_slice(data).map_err(|e| SyncError::Persistence(format!("decode: {}", e)))
    }
}

// ============================================================================
// Adapter
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub document: ManifestDocument,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct PersistenceAdapter {
    file_system: Arc<dyn FileSystemAccess>,
    codec: Arc<dyn ManifestCodec>,
}

impl PersistenceAdapter {
    /// Adapter using [`JsonManifestCodec`].
    pub fn new(file_system: Arc<dyn FileSystemAccess>) -> Self {
        Self::with_codec(file_system, Arc::new(JsonManifestCodec))
    }

    pub fn with_codec(file_system: Arc<dyn FileSystemAccess>, codec: Arc<dyn ManifestCodec>) -> Self {
        Self { file_system, codec }
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        self.file_system
            .exists(path)
            .await
            .map_err(|e| SyncError::io(path.display(), e))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn load(&self, path: &Path) -> Result<LoadedManifest> {
        let data = self
            .file_system
            .read_file(path)
            .await
            .map_err(|e| SyncError::io(path.display(), e))?;
        let document = self.codec.decode(&data)?;

        let warnings = self.codec.verify(&document);
        for warning in &warnings {
            warn!(warning = %warning, "Manifest verification warning");
        }

        debug!(files = document.files.len(), "Loaded manifest");
        Ok(LoadedManifest { document, warnings })
    }

    #[instrument(skip(self, document), fields(path = %path.display(), files = document.files.len()))]
    pub async fn save(&self, document: &ManifestDocument, path: &Path) -> Result<()> {
        let data = self.codec.encode(document)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.file_system
                .create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent.display(), e))?;
        }
        self.file_system
            .write_file_atomic(path, data)
            .await
            .map_err(|e| SyncError::io(path.display(), e))?;

        info!("Saved manifest");
        Ok(())
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}
