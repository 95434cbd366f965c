//! # File Records
//!
//! Per-file manifest entries and the builder that derives them from file
//! content.
//!
//! ## Overview
//!
//! A [`FileRecord`] holds two kinds of data:
//! - content-derived fields (`sha1`, `file_type`, `seen_licenses`) which are
//!   recomputed every time the file is rebuilt
//! - annotations (concluded license, copyright, notice, comment, contributors,
//!   artifact-of) which start from the scanner or the project defaults and
//!   can then be edited by the user; see [`FileOverrides`]
//!
//! [`FileRecordBuilder`] is pure with respect to the manifest: it reads the
//! file, hashes it and runs the license scanner, but never touches shared
//! state.

use crate::{Result, SyncError};
use bridge_traits::license::{
    LicenseExpression, LicenseExpressionParser, LicenseScanner, ScanReport, NOASSERTION,
};
use bridge_traits::storage::FileSystemAccess;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Default per-file copyright template.
pub const DEFAULT_FILE_COPYRIGHT: &str = "Copyright (c) [year], [organization]";

const BINARY_PROBE_LEN: usize = 8 * 1024;

const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "h", "cc", "cpp", "cxx", "hpp", "hh", "java", "rs", "py", "php", "js", "ts", "go", "rb",
    "pl", "pm", "sh", "bash", "cs", "m", "mm", "swift", "kt", "scala", "lua", "sql", "html", "htm",
    "css", "xml", "asm", "s",
];

const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "jar", "war", "ear", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "a", "o", "so", "dll", "exe", "class", "bin", "lib", "dylib", "obj", "png", "jpg", "jpeg",
    "gif", "pdf",
];

// ============================================================================
// Record Types
// ============================================================================

/// File classification recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Source,
    Binary,
    Archive,
    Other,
}

impl FileType {
    /// Classify by extension, falling back to a NUL-byte probe of the content.
    pub fn classify(path: &str, content: &[u8]) -> Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some(ext) if SOURCE_EXTENSIONS.contains(&ext) => FileType::Source,
            Some(ext) if ARCHIVE_EXTENSIONS.contains(&ext) => FileType::Archive,
            Some(ext) if BINARY_EXTENSIONS.contains(&ext) => FileType::Binary,
            _ if content.iter().take(BINARY_PROBE_LEN).any(|b| *b == 0) => FileType::Binary,
            _ => FileType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Source => "source",
            FileType::Binary => "binary",
            FileType::Archive => "archive",
            FileType::Other => "other",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Project a file was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOf {
    pub name: String,
    pub url: String,
}

impl ArtifactOf {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One manifest entry, keyed by project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    /// Lowercase hex SHA-1 of the file content
    pub sha1: String,
    pub file_type: FileType,
    /// Licenses the scanner found in the content
    pub seen_licenses: BTreeSet<LicenseExpression>,
    pub concluded_license: LicenseExpression,
    pub copyright: String,
    #[serde(default)]
    pub notice: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub artifact_of: Vec<ArtifactOf>,
}

impl FileRecord {
    /// The user-editable part of this record.
    pub fn overrides(&self) -> FileOverrides {
        FileOverrides {
            concluded_license: self.concluded_license.clone(),
            copyright: self.copyright.clone(),
            notice: self.notice.clone(),
            comment: self.comment.clone(),
            contributors: self.contributors.clone(),
            artifact_of: self.artifact_of.clone(),
        }
    }

    /// Replace annotations with previously captured overrides.
    pub fn apply_overrides(&mut self, overrides: FileOverrides) {
        self.concluded_license = overrides.concluded_license;
        self.copyright = overrides.copyright;
        self.notice = overrides.notice;
        self.comment = overrides.comment;
        self.contributors = overrides.contributors;
        self.artifact_of = overrides.artifact_of;
    }
}

/// Annotations preserved when a record is rebuilt from changed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOverrides {
    pub concluded_license: LicenseExpression,
    pub copyright: String,
    pub notice: String,
    pub comment: String,
    pub contributors: Vec<String>,
    pub artifact_of: Vec<ArtifactOf>,
}

/// Project-wide defaults for new file records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDefaults {
    pub license: LicenseExpression,
    pub copyright: String,
    #[serde(default)]
    pub notice: String,
    #[serde(default)]
    pub contributors: Vec<String>,
}

impl Default for FileDefaults {
    fn default() -> Self {
        Self {
            license: LicenseExpression::NoAssertion,
            copyright: DEFAULT_FILE_COPYRIGHT.to_string(),
            notice: String::new(),
            contributors: Vec::new(),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Hex-encoded SHA-1 of `content`, lowercase.
pub fn sha1_hex(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Derives a [`FileRecord`] from a file on disk.
#[derive(Clone)]
pub struct FileRecordBuilder {
    file_system: Arc<dyn FileSystemAccess>,
    scanner: Option<Arc<dyn LicenseScanner>>,
    parser: Arc<dyn LicenseExpressionParser>,
}

impl FileRecordBuilder {
    pub fn new(
        file_system: Arc<dyn FileSystemAccess>,
        scanner: Option<Arc<dyn LicenseScanner>>,
        parser: Arc<dyn LicenseExpressionParser>,
    ) -> Self {
        Self {
            file_system,
            scanner,
            parser,
        }
    }

    /// Build the record for `relative_path` under `root`.
    ///
    /// Without a scanner the record carries the project defaults and no seen
    /// licenses. License tokens the parser rejects are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the file cannot be read. A scanner
    /// failure is logged and treated as an empty scan.
    #[instrument(skip(self, root, defaults), fields(path = %relative_path))]
    pub async fn build(
        &self,
        root: &Path,
        relative_path: &str,
        defaults: &FileDefaults,
    ) -> Result<FileRecord> {
        let full_path = root.join(relative_path);
        let content = self
            .file_system
            .read_file(&full_path)
            .await
            .map_err(|e| SyncError::io(relative_path, e))?;

        let report = match &self.scanner {
            Some(scanner) => match scanner.scan(&full_path, &content).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "License scan failed; using project defaults");
                    None
                }
            },
            None => None,
        };

        let record = match report {
            Some(report) => self.record_from_scan(relative_path, &content, report, defaults),
            None => FileRecord {
                path: relative_path.to_string(),
                sha1: sha1_hex(&content),
                file_type: FileType::classify(relative_path, &content),
                seen_licenses: BTreeSet::new(),
                concluded_license: defaults.license.clone(),
                copyright: defaults.copyright.clone(),
                notice: defaults.notice.clone(),
                comment: String::new(),
                contributors: defaults.contributors.clone(),
                artifact_of: Vec::new(),
            },
        };

        debug!(
            sha1 = %record.sha1,
            file_type = %record.file_type,
            seen = record.seen_licenses.len(),
            "Built file record"
        );
        Ok(record)
    }

    fn record_from_scan(
        &self,
        relative_path: &str,
        content: &[u8],
        report: ScanReport,
        defaults: &FileDefaults,
    ) -> FileRecord {
        let mut seen_licenses = BTreeSet::new();
        for token in &report.license_tokens {
            match self.parser.parse(token) {
                Ok(expression) => {
                    seen_licenses.insert(expression);
                }
                Err(e) => warn!(token = %token, error = %e, "Skipping unparseable license token"),
            }
        }

        FileRecord {
            path: relative_path.to_string(),
            sha1: sha1_hex(content),
            file_type: FileType::classify(relative_path, content),
            seen_licenses,
            concluded_license: defaults.license.clone(),
            copyright: report
                .copyright
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| defaults.copyright.clone()),
            notice: report.notice.unwrap_or_else(|| defaults.notice.clone()),
            comment: String::new(),
            contributors: defaults.contributors.clone(),
            artifact_of: Vec::new(),
        }
    }
}

/// Placeholder copyright used when a property change clears it.
pub(crate) fn cleared_copyright() -> String {
    NOASSERTION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use mockall::mock;
    use std::path::PathBuf;

    struct SingleFileFs {
        content: &'static [u8],
    }

    #[async_trait]
    impl FileSystemAccess for SingleFileFs {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(true)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Ok(FileMetadata {
                size: self.content.len() as u64,
                modified_at: None,
                is_directory: false,
                is_symlink: false,
            })
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
            if path.ends_with("missing.c") {
                return Err(BridgeError::OperationFailed("not found".into()));
            }
            Ok(Bytes::from_static(self.content))
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    struct IdParser;

    impl LicenseExpressionParser for IdParser {
        fn parse(&self, expression: &str) -> BridgeResult<LicenseExpression> {
            if expression.contains(' ') {
                return Err(BridgeError::InvalidInput(expression.to_string()));
            }
            Ok(LicenseExpression::standard(expression))
        }
    }

    mock! {
        Scanner {}

        #[async_trait]
        impl LicenseScanner for Scanner {
            async fn scan(&self, path: &Path, content: &[u8]) -> BridgeResult<ScanReport>;
        }
    }

    fn builder(scanner: Option<Arc<dyn LicenseScanner>>) -> FileRecordBuilder {
        FileRecordBuilder::new(
            Arc::new(SingleFileFs { content: b"abc" }),
            scanner,
            Arc::new(IdParser),
        )
    }

    #[test]
    fn test_sha1_hex_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_classify() {
        assert_eq!(FileType::classify("src/a.c", b""), FileType::Source);
        assert_eq!(FileType::classify("bin/a.a", b""), FileType::Binary);
        assert_eq!(FileType::classify("dist/a.tar", b""), FileType::Archive);
        assert_eq!(FileType::classify("README", b"text"), FileType::Other);
        assert_eq!(FileType::classify("blob", b"\x00\x01"), FileType::Binary);
    }

    #[tokio::test]
    async fn test_build_without_scanner_uses_defaults() {
        let defaults = FileDefaults {
            license: LicenseExpression::standard("Apache-2.0"),
            copyright: "Copyright (c) 2012 Acme".into(),
            notice: "notice".into(),
            contributors: vec!["alice".into()],
        };

        let record = builder(None)
            .build(Path::new("/project"), "src/a.c", &defaults)
            .await
            .unwrap();

        assert_eq!(record.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(record.concluded_license, defaults.license);
        assert_eq!(record.copyright, defaults.copyright);
        assert_eq!(record.contributors, defaults.contributors);
        assert!(record.seen_licenses.is_empty());
    }

    #[tokio::test]
    async fn test_build_with_scanner_records_seen_licenses() {
        let mut scanner = MockScanner::new();
        scanner.expect_scan().times(1).returning(|_, _| {
            Ok(ScanReport {
                license_tokens: vec!["MIT".into(), "not valid".into()],
                copyright: Some("Copyright 2020 Example".into()),
                notice: None,
            })
        });

        let record = builder(Some(Arc::new(scanner)))
            .build(Path::new("/project"), "src/a.c", &FileDefaults::default())
            .await
            .unwrap();

        assert_eq!(record.seen_licenses.len(), 1);
        assert!(record
            .seen_licenses
            .contains(&LicenseExpression::standard("MIT")));
        assert_eq!(record.copyright, "Copyright 2020 Example");
        assert_eq!(record.concluded_license, LicenseExpression::NoAssertion);
    }

    #[tokio::test]
    async fn test_scanner_failure_falls_back_to_defaults() {
        let mut scanner = MockScanner::new();
        scanner
            .expect_scan()
            .returning(|_, _| Err(BridgeError::OperationFailed("tool crashed".into())));

        let record = builder(Some(Arc::new(scanner)))
            .build(Path::new("/project"), "src/a.c", &FileDefaults::default())
            .await
            .unwrap();

        assert_eq!(record.copyright, DEFAULT_FILE_COPYRIGHT);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_io_error() {
        let err = builder(None)
            .build(Path::new("/project"), "src/missing.c", &FileDefaults::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Io { ref path, .. } if path == "src/missing.c"));
    }

    #[test]
    fn test_overrides_round_trip() {
        let mut record = FileRecord {
            path: "a.c".into(),
            sha1: sha1_hex(b"a"),
            file_type: FileType::Source,
            seen_licenses: BTreeSet::new(),
            concluded_license: LicenseExpression::standard("MIT"),
            copyright: "mine".into(),
            notice: String::new(),
            comment: "reviewed".into(),
            contributors: vec![],
            artifact_of: vec![ArtifactOf::new("upstream", "http://example.org")],
        };
        let overrides = record.overrides();

        record.comment.clear();
        record.artifact_of.clear();
        record.apply_overrides(overrides);

        assert_eq!(record.comment, "reviewed");
        assert_eq!(record.artifact_of.len(), 1);
    }
}
