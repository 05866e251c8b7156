//! Error types for the storage layer.

use nbrepo_core::{InviteId, NotebookPath, PublicationId, ShareId, TagId, Username};
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Connection(#[from] sqlx::Error),

    /// Publication not found.
    #[error("publication not found: {0}")]
    PublicationNotFound(PublicationId),

    /// A publication already exists for this owner and path.
    #[error("{owner} has already published {api_path}")]
    DuplicatePublication {
        owner: Username,
        api_path: NotebookPath,
    },

    /// Share not found.
    #[error("share not found: {0}")]
    ShareNotFound(ShareId),

    /// Invite not found (never existed, declined, or its share was removed).
    #[error("invite not found: {0}")]
    InviteNotFound(InviteId),

    /// Tag not found.
    #[error("tag not found: {0}")]
    TagNotFound(TagId),

    /// A share must keep at least one collaborator.
    #[error("a share needs at least one collaborator")]
    EmptyCollaborators,

    /// A stored value no longer parses as its domain type.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// Migration error.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> Self {
        Self::CorruptRow {
            table,
            reason: reason.to_string(),
        }
    }

    /// True for the "stale id or path" family that callers refresh on.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PublicationNotFound(_)
                | Self::ShareNotFound(_)
                | Self::InviteNotFound(_)
                | Self::TagNotFound(_)
        )
    }
}
