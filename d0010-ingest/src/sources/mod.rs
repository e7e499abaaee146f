//! Where flow files come from.

pub mod inbox_dir;
pub mod path_list;

pub use inbox_dir::InboxDirSource;
pub use path_list::PathListSource;

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
};

use futures::Stream;

/// Raw contents of one flow file plus the name it is tracked under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFileInput {
    pub filename: String,
    /// Set when the file was read from disk.
    pub path: Option<PathBuf>,
    pub contents: Vec<u8>,
}

impl FlowFileInput {
    pub fn new(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            path: None,
            contents: contents.into(),
        }
    }

    /// Read a file; the tracked filename is its final path component.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let filename = display_name(path);
        let contents = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound { path: path.to_path_buf() }
            } else {
                SourceError::Read {
                    filename: filename.clone(),
                    source: e,
                }
            }
        })?;

        Ok(Self {
            filename,
            path: Some(path.to_path_buf()),
            contents,
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read {filename}: {source}")]
    Read {
        filename: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to list {}: {source}", dir.display())]
    ListDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Name to report the failure under.
    pub fn filename(&self) -> String {
        match self {
            Self::NotFound { path } => display_name(path),
            Self::Read { filename, .. } => filename.clone(),
            Self::ListDir { dir, .. } => dir.display().to_string(),
        }
    }
}

pub type FlowFileStream = Pin<Box<dyn Stream<Item = Result<FlowFileInput, SourceError>> + Send>>;

#[async_trait::async_trait]
pub trait FlowFileSource: Send + Sync {
    async fn stream(&self) -> FlowFileStream;
}
