//! Open a separated stem for streaming
//!
//! The returned stream reads the file lazily in fixed-size chunks. The
//! workspace holding the file is released exactly once, either after the
//! last chunk or when the stream is dropped early (client abort).

use axum::body::Bytes;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::features::shared::is_safe_component;
use crate::tools::separator::{ACCOMPANIMENT_FILE, VOCALS_FILE};
use crate::workspace::WorkspaceManager;

pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

pub const STREAM_CONTENT_TYPE: &str = "audio/wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemKind {
    Vocal,
    Accompaniment,
}

impl StemKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            StemKind::Vocal => VOCALS_FILE,
            StemKind::Accompaniment => ACCOMPANIMENT_FILE,
        }
    }
}

impl FromStr for StemKind {
    type Err = OpenStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocal" => Ok(StemKind::Vocal),
            "accompaniment" => Ok(StemKind::Accompaniment),
            other => Err(OpenStreamError::InvalidKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStreamQuery {
    pub kind: String,
    pub workspace_id: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenStreamError {
    #[error("Invalid stream kind '{0}'; expected 'vocal' or 'accompaniment'")]
    InvalidKind(String),
    #[error("Stream not found")]
    NotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpenStreamQuery {
    /// Resolve to the stem file, rejecting anything that is not a plain path component
    pub fn locate(&self, workspaces: &WorkspaceManager) -> Result<PathBuf, OpenStreamError> {
        let kind: StemKind = self.kind.parse()?;
        if !is_safe_component(&self.name) {
            return Err(OpenStreamError::NotFound);
        }
        let dir = workspaces
            .resolve(&self.workspace_id)
            .map_err(|_| OpenStreamError::NotFound)?;
        Ok(dir.join(&self.name).join(kind.file_name()))
    }
}

/// Releases its workspace when dropped unless already fired
struct ReleaseOnDrop {
    workspaces: WorkspaceManager,
    workspace_id: String,
    fired: bool,
}

impl ReleaseOnDrop {
    fn fire(&mut self) {
        if !self.fired {
            self.fired = true;
            debug!(workspace = %self.workspace_id, "Stream finished, releasing workspace");
            self.workspaces.release(&self.workspace_id);
        }
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.fire();
    }
}

struct StreamState {
    file: File,
    release: ReleaseOnDrop,
}

/// Read up to one chunk; a short read only happens at end of file
async fn read_chunk(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(STREAM_CHUNK_SIZE);
    file.take(STREAM_CHUNK_SIZE as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

pub type StemStream = std::pin::Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[tracing::instrument(skip(workspaces), fields(kind = %query.kind, workspace = %query.workspace_id))]
pub async fn handle(
    workspaces: &WorkspaceManager,
    query: OpenStreamQuery,
) -> Result<StemStream, OpenStreamError> {
    let path = query.locate(workspaces)?;

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(OpenStreamError::NotFound),
        Err(e) => return Err(e.into()),
    };

    let state = StreamState {
        file,
        release: ReleaseOnDrop {
            workspaces: workspaces.clone(),
            workspace_id: query.workspace_id,
            fired: false,
        },
    };

    let body = stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match read_chunk(&mut state.file).await {
            Ok(chunk) if chunk.is_empty() => {
                state.release.fire();
                None
            }
            Ok(chunk) => Some((Ok(Bytes::from(chunk)), Some(state))),
            // Dropping the state releases the workspace.
            Err(e) => Some((Err(e), None)),
        }
    });

    Ok(Box::pin(body))
}
