use std::path::{Path, PathBuf};

use super::{FlowFileInput, FlowFileSource, FlowFileStream, SourceError};
use crate::pipeline::{ImportStatus, ImportSummary};

/// Every regular file in a directory with a matching extension, in filename order.
pub struct InboxDirSource {
    dir: PathBuf,
    extension: Option<String>,
}

impl InboxDirSource {
    /// `extension` is compared case-insensitively, without the dot. `None`
    /// accepts every file.
    pub fn new(dir: impl Into<PathBuf>, extension: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.map(|e| e.trim_start_matches('.').to_ascii_lowercase()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn accepts(&self, path: &Path) -> bool {
        match &self.extension {
            None => true,
            Some(wanted) => path
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
                .unwrap_or(false),
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>, SourceError> {
        let list_err = |source: std::io::Error| SourceError::ListDir {
            dir: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(list_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let path = entry.path();
            if is_file && self.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait::async_trait]
impl FlowFileSource for InboxDirSource {
    async fn stream(&self) -> FlowFileStream {
        let listed = self.list().await;
        let s = async_stream::stream! {
            match listed {
                Ok(paths) => {
                    for path in paths {
                        yield FlowFileInput::read(&path).await;
                    }
                }
                Err(e) => yield Err(e),
            }
        };
        Box::pin(s)
    }
}

/// Move a processed file into `archive_dir`, keeping its name.
pub async fn archive(path: &Path, archive_dir: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(archive_dir).await?;
    let name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let target = archive_dir.join(name);
    tokio::fs::rename(path, &target).await?;
    Ok(target)
}

/// Where a processed inbox file moves to. `None` leaves it in the inbox for
/// the next round.
pub fn destination(summary: &ImportSummary, archive_dir: Option<&Path>, failed_dir: &Path) -> Option<PathBuf> {
    match summary.status {
        ImportStatus::Done | ImportStatus::Rejected => archive_dir.map(Path::to_path_buf),
        ImportStatus::Aborted if summary.is_retryable() => None,
        ImportStatus::Aborted => Some(failed_dir.to_path_buf()),
    }
}
