//! Workspace collaborator: moves notebook content between user workspaces.
//!
//! The coordination layer only decides *whether* a copy may happen; the
//! bytes are moved by an implementation of [`Workspace`]. The shipped
//! [`FsWorkspace`] expects one directory per user under a common root.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nbrepo_core::{NotebookPath, Username};
use tokio::fs::{self, OpenOptions};

/// Upper bound on `name (copy N).ext` candidates tried before giving up.
const MAX_COPY_SUFFIX: u32 = 100;

/// Failures of the workspace collaborator.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("source notebook '{0}' does not exist")]
    SourceMissing(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("no free file name for '{0}' in the destination")]
    NoFreeName(String),

    #[error("workspace copy timed out after {0:?}")]
    TimedOut(Duration),

    #[error("workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Moves notebook content on behalf of a user.
///
/// Paths in and out are relative to the relevant user's workspace.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Copy `owner`'s notebook at `source` into `user`'s `destination`
    /// directory under a file name not yet taken there.
    async fn copy_into(
        &self,
        owner: &Username,
        source: &NotebookPath,
        user: &Username,
        destination: &NotebookPath,
    ) -> Result<NotebookPath, WorkspaceError>;

    /// Overwrite `user`'s copy of a shared notebook at
    /// `destination/<file name>` with `owner`'s current content.
    async fn sync_shared(
        &self,
        owner: &Username,
        source: &NotebookPath,
        user: &Username,
        destination: &NotebookPath,
    ) -> Result<NotebookPath, WorkspaceError>;
}

/// Filesystem workspace rooted at `root/<username>/`.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
    timeout: Duration,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    fn resolve(&self, user: &Username, path: &NotebookPath) -> PathBuf {
        let mut full = self.root.join(user.as_str());
        for segment in path.segments() {
            full.push(segment);
        }
        full
    }

    async fn bounded<T, F>(&self, work: F) -> Result<T, WorkspaceError>
    where
        F: std::future::Future<Output = Result<T, WorkspaceError>>,
    {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| WorkspaceError::TimedOut(self.timeout))?
    }

    async fn open_source(&self, owner: &Username, source: &NotebookPath) -> Result<fs::File, WorkspaceError> {
        let path = self.resolve(owner, source);
        match fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(WorkspaceError::SourceMissing(source.qualified(owner)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare_destination(
        &self,
        user: &Username,
        destination: &NotebookPath,
    ) -> Result<PathBuf, WorkspaceError> {
        let dir = self.resolve(user, destination);
        if let Ok(meta) = fs::metadata(&dir).await
            && !meta.is_dir()
        {
            return Err(WorkspaceError::InvalidDestination(format!(
                "'{destination}' is a file"
            )));
        }
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// `stem.ext`, `stem (copy 1).ext`, `stem (copy 2).ext`, ...
pub fn copy_candidate(file_name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} (copy {attempt}).{ext}"),
        _ => format!("{file_name} (copy {attempt})"),
    }
}

fn relative(destination: &NotebookPath, file_name: &str) -> Result<NotebookPath, WorkspaceError> {
    NotebookPath::parse(&format!("{destination}/{file_name}"))
        .map_err(|e| WorkspaceError::InvalidDestination(e.to_string()))
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn copy_into(
        &self,
        owner: &Username,
        source: &NotebookPath,
        user: &Username,
        destination: &NotebookPath,
    ) -> Result<NotebookPath, WorkspaceError> {
        let file_name = source.file_name();
        // Fail before touching the disk when even the plain name cannot be addressed.
        relative(destination, file_name)?;

        // Set once a target file exists, so a failure or timeout afterwards can remove it.
        let mut created: Option<PathBuf> = None;
        let result = self
            .bounded(async {
                let mut src = self.open_source(owner, source).await?;
                let dir = self.prepare_destination(user, destination).await?;

                for attempt in 0..=MAX_COPY_SUFFIX {
                    let candidate = copy_candidate(file_name, attempt);
                    let location = relative(destination, &candidate)?;
                    let target = dir.join(&candidate);
                    let mut dst =
                        match OpenOptions::new().write(true).create_new(true).open(&target).await {
                            Ok(file) => file,
                            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                            Err(e) => return Err(e.into()),
                        };
                    created = Some(target.clone());
                    let bytes = tokio::io::copy(&mut src, &mut dst).await?;
                    dst.sync_all().await?;
                    tracing::debug!(
                        owner = %owner,
                        user = %user,
                        target = %target.display(),
                        bytes,
                        "Copied notebook into workspace"
                    );
                    return Ok(location);
                }
                Err(WorkspaceError::NoFreeName(file_name.to_string()))
            })
            .await;

        if result.is_err()
            && let Some(target) = created
            && let Err(e) = fs::remove_file(&target).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(
                target = %target.display(),
                error = %e,
                "Failed to remove partial notebook copy"
            );
        }
        result
    }

    async fn sync_shared(
        &self,
        owner: &Username,
        source: &NotebookPath,
        user: &Username,
        destination: &NotebookPath,
    ) -> Result<NotebookPath, WorkspaceError> {
        let location = relative(destination, source.file_name())?;
        self.bounded(async {
            let src_path = self.resolve(owner, source);
            if fs::metadata(&src_path).await.is_err() {
                return Err(WorkspaceError::SourceMissing(source.qualified(owner)));
            }
            let dir = self.prepare_destination(user, destination).await?;
            let target = dir.join(source.file_name());
            let bytes = fs::copy(&src_path, &target).await?;
            tracing::debug!(
                owner = %owner,
                user = %user,
                target = %target.display(),
                bytes,
                "Synced shared notebook"
            );
            Ok(location)
        })
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
