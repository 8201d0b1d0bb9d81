//! Root-scoped local filesystem connector.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use famulus_core::connector::LocalFileParams;

use crate::error::ConnectorError;

/// Suffix of files still being written. Copies go to `<target>.famulus`
/// first and are renamed once complete, so consumers polling the target
/// directory never pick up half-written files.
pub const TRANSFER_SUFFIX: &str = ".famulus";

/// One file of a directory listing.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub directory: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Filesystem access confined to a root directory.
///
/// All file parameters are resolved relative to the root; absolute paths
/// and `..` components are rejected so a job cannot reach outside the
/// directory its connector was granted.
#[derive(Debug)]
pub struct FileConnector {
    root: PathBuf,
}

impl FileConnector {
    pub fn new(params: &LocalFileParams) -> Self {
        Self {
            root: PathBuf::from(&params.root),
        }
    }

    /// Verify the root exists and is readable.
    pub async fn test(&self) -> Result<(), ConnectorError> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ConnectorError::Configuration(format!(
                "connector root is not a directory: {}",
                self.root.display()
            )));
        }
        tokio::fs::read_dir(&self.root).await?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ConnectorError> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(ConnectorError::Configuration(format!(
                "path escapes connector root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// List regular files in a directory, name-sorted. An empty
    /// `file_ending` matches everything.
    pub async fn list_files(
        &self,
        directory: &str,
        file_ending: &str,
    ) -> Result<Vec<FileInfo>, ConnectorError> {
        let dir = self.resolve(directory)?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !file_ending.is_empty() && !name.ends_with(file_ending) {
                continue;
            }
            files.push(FileInfo {
                name,
                directory: directory.to_string(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn read_to_string(&self, file: &str) -> Result<String, ConnectorError> {
        let path = self.resolve(file)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Copy a file into another connector's tree. With `transfer_suffix`
    /// the data lands under [`TRANSFER_SUFFIX`] first and is renamed once
    /// the copy completed. Returns the copied byte count.
    pub async fn copy_to(
        &self,
        source_file: &str,
        target: &FileConnector,
        target_file: &str,
        transfer_suffix: bool,
    ) -> Result<u64, ConnectorError> {
        let source_path = self.resolve(source_file)?;
        let final_path = target.resolve(target_file)?;
        let write_path = if transfer_suffix {
            append_suffix(&final_path)
        } else {
            final_path.clone()
        };
        if let Some(parent) = write_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source_path, &write_path).await?;
        if transfer_suffix {
            tokio::fs::rename(&write_path, &final_path).await?;
        }
        Ok(bytes)
    }

    pub async fn rename(&self, source_file: &str, target_file: &str) -> Result<(), ConnectorError> {
        let source_path = self.resolve(source_file)?;
        let target_path = self.resolve(target_file)?;
        if let Some(parent) = target_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source_path, &target_path).await?;
        Ok(())
    }

    pub async fn delete(&self, file: &str) -> Result<(), ConnectorError> {
        let path = self.resolve(file)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    pub async fn exists(&self, file: &str) -> Result<bool, ConnectorError> {
        let path = self.resolve(file)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

fn append_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TRANSFER_SUFFIX);
    PathBuf::from(name)
}
