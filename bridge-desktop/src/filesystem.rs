//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Tokio-based file system implementation
///
/// Atomic writes go to a uniquely named hidden sibling, are flushed to disk
/// and then renamed over the destination, so a concurrent reader sees either
/// the old manifest or the new one.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn temp_sibling(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let link = fs::symlink_metadata(path).await.map_err(Self::map_io_error)?;
        let is_symlink = link.file_type().is_symlink();
        let metadata = if is_symlink {
            fs::metadata(path).await.map_err(Self::map_io_error)?
        } else {
            link
        };

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
            is_symlink,
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;
        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(Self::map_io_error)?
        {
            entries.push(entry.path());
        }
        entries.sort();

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;
        let staging = Self::temp_sibling(path);

        let staged = async {
            let mut file = fs::File::create(&staging)
                .await
                .map_err(Self::map_io_error)?;
            file.write_all(data.as_ref())
                .await
                .map_err(Self::map_io_error)?;
            file.sync_all().await.map_err(Self::map_io_error)?;
            fs::rename(&staging, path)
                .await
                .map_err(Self::map_io_error)
        }
        .await;

        if let Err(err) = staged {
            let _ = fs::remove_file(&staging).await;
            return Err(err);
        }

        debug!(path = ?path, size = data.len(), "Atomically replaced file");
        Ok(())
    }
}
