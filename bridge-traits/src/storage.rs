//! File System Abstractions
//!
//! Provides the platform-agnostic file access used to walk a project tree,
//! read file content for hashing and persist the manifest document.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
    /// The entry itself is a symbolic link; the other fields describe its
    /// target.
    pub is_symlink: bool,
}

/// File system access trait
///
/// Abstracts file I/O so the sync core can run against:
/// - Desktop: the real file system via `tokio::fs`
/// - IDE hosts: the workspace model of the embedding editor
/// - Tests: an in-memory tree
///
/// # Atomicity
///
/// [`write_file_atomic`](FileSystemAccess::write_file_atomic) must never let a
/// reader observe a half-written file. The default implementation stages the
/// data in a sibling temp file and renames it over the destination; hosts with
/// a native transactional write should override it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn persist(fs: &dyn FileSystemAccess, path: &Path, doc: Bytes) -> Result<()> {
///     fs.write_file_atomic(path, doc).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Move a file. Fails if the source does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Replace the content of `path` all-or-nothing.
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        let staging = staging_path(path);
        self.write_file(&staging, data).await?;
        if let Err(err) = self.rename(&staging, path).await {
            let _ = self.delete_file(&staging).await;
            return Err(err);
        }
        Ok(())
    }
}

/// Sibling path used to stage an atomic write of `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryFs {
        files: Mutex<HashMap<PathBuf, Bytes>>,
        fail_rename: bool,
    }

    #[async_trait]
    impl FileSystemAccess for MemoryFs {
        async fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
            let files = self.files.lock().unwrap();
            let data = files
                .get(path)
                .ok_or_else(|| BridgeError::OperationFailed("missing".into()))?;
            Ok(FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                is_directory: false,
                is_symlink: false,
            })
        }

        async fn create_dir_all(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn read_file(&self, path: &Path) -> Result<Bytes> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| BridgeError::OperationFailed("missing".into()))
        }

        async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
            self.files.lock().unwrap().insert(path.to_path_buf(), data);
            Ok(())
        }

        async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            if self.fail_rename {
                return Err(BridgeError::OperationFailed("rename refused".into()));
            }
            let mut files = self.files.lock().unwrap();
            let data = files
                .remove(from)
                .ok_or_else(|| BridgeError::OperationFailed("missing".into()))?;
            files.insert(to.to_path_buf(), data);
            Ok(())
        }

        async fn delete_file(&self, path: &Path) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.files.lock().unwrap().keys().cloned().collect())
        }
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staged = staging_path(Path::new("/work/project/demo.spdx"));
        assert_eq!(staged, PathBuf::from("/work/project/.demo.spdx.tmp"));
    }

    #[tokio::test]
    async fn test_default_atomic_write_replaces_target() {
        let fs = MemoryFs::default();
        let target = Path::new("/p/demo.spdx");
        fs.write_file(target, Bytes::from("old")).await.unwrap();

        fs.write_file_atomic(target, Bytes::from("new")).await.unwrap();

        assert_eq!(fs.read_file(target).await.unwrap(), Bytes::from("new"));
        assert!(!fs.exists(&staging_path(target)).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_rename_keeps_previous_content() {
        let fs = MemoryFs {
            fail_rename: true,
            ..Default::default()
        };
        let target = Path::new("/p/demo.spdx");
        fs.write_file(target, Bytes::from("old")).await.unwrap();

        assert!(fs
            .write_file_atomic(target, Bytes::from("new"))
            .await
            .is_err());
        assert_eq!(fs.read_file(target).await.unwrap(), Bytes::from("old"));
        assert!(!fs.exists(&staging_path(target)).await.unwrap());
    }
}
