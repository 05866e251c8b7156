//! Database models for the storage layer.
//!
//! `*Row` types map directly to database rows and are used for sqlx queries.
//! The record types are what the store hands back: rows joined with their
//! children and parsed into the validated types from nbrepo-core.

use chrono::{DateTime, Utc};
use nbrepo_core::{
    InviteId, NotebookPath, PublicationId, Quality, ShareId, TagId, TagLabel, Username,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};

// ============================================================================
// Users
// ============================================================================

/// Database row for the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub username: String,
    pub admin: bool,
    pub created: DateTime<Utc>,
}

/// A user that has authenticated at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: Username,
    pub admin: bool,
    pub created: DateTime<Utc>,
}

impl UserRow {
    pub fn into_record(self) -> StoreResult<UserRecord> {
        Ok(UserRecord {
            username: Username::parse(&self.username).map_err(|e| StoreError::corrupt("users", e))?,
            admin: self.admin,
            created: self.created,
        })
    }
}

// ============================================================================
// Publications
// ============================================================================

/// Database row for the `publications` table.
#[derive(Debug, Clone, FromRow)]
pub struct PublicationRow {
    pub id: i64,
    pub owner: String,
    pub api_path: String,
    pub file_path: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub quality: String,
    pub citation: Option<String>,
    pub copied: i64,
    pub launched: i64,
    pub publication_date: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl PublicationRow {
    pub fn into_record(self, tags: Vec<TagLabel>) -> StoreResult<PublicationRecord> {
        let corrupt = |e: nbrepo_core::ValueError| StoreError::corrupt("publications", e);
        Ok(PublicationRecord {
            id: PublicationId(self.id),
            owner: Username::parse(&self.owner).map_err(corrupt)?,
            api_path: NotebookPath::parse(&self.api_path).map_err(corrupt)?,
            file_path: self.file_path,
            name: self.name,
            description: self.description,
            author: self.author,
            quality: self.quality.parse().map_err(corrupt)?,
            citation: self.citation,
            tags,
            copied: u64::try_from(self.copied).unwrap_or_default(),
            launched: u64::try_from(self.launched).unwrap_or_default(),
            publication_date: self.publication_date,
            updated: self.updated,
        })
    }
}

/// The fields a publisher controls; `update` replaces all of them at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationMetadata {
    pub name: String,
    pub description: String,
    pub author: String,
    pub quality: Quality,
    pub citation: Option<String>,
    pub tags: Vec<TagLabel>,
}

/// Input for creating a publication.
#[derive(Debug, Clone)]
pub struct NewPublication {
    pub owner: Username,
    pub api_path: NotebookPath,
    pub file_path: String,
    pub metadata: PublicationMetadata,
}

/// A notebook in the public library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationRecord {
    pub id: PublicationId,
    pub owner: Username,
    pub api_path: NotebookPath,
    pub file_path: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub quality: Quality,
    pub citation: Option<String>,
    pub tags: Vec<TagLabel>,
    pub copied: u64,
    pub launched: u64,
    pub publication_date: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Publication counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Copied,
    Launched,
}

// ============================================================================
// Tags
// ============================================================================

/// Database row for the `tags` table.
#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub id: i64,
    pub label: String,
    pub description: String,
    pub pinned: bool,
    pub protected: bool,
}

impl TagRow {
    pub fn into_record(self) -> StoreResult<TagRecord> {
        Ok(TagRecord {
            id: TagId(self.id),
            label: TagLabel::parse(&self.label).map_err(|e| StoreError::corrupt("tags", e))?,
            description: self.description,
            pinned: self.pinned,
            protected: self.protected,
        })
    }
}

/// A tag and its governance flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub id: TagId,
    pub label: TagLabel,
    pub description: String,
    pub pinned: bool,
    pub protected: bool,
}

/// Flag changes for a tag; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagChanges {
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub protected: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TagChanges {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.protected.is_none() && self.description.is_none()
    }

    pub(crate) fn apply(&self, tag: &mut TagRecord) {
        if let Some(pinned) = self.pinned {
            tag.pinned = pinned;
        }
        if let Some(protected) = self.protected {
            tag.protected = protected;
        }
        if let Some(description) = &self.description {
            tag.description = description.clone();
        }
    }
}

// ============================================================================
// Shares
// ============================================================================

/// Database row for the `shares` table.
#[derive(Debug, Clone, FromRow)]
pub struct ShareRow {
    pub id: i64,
    pub owner: String,
    pub notebook_path: String,
    pub created: DateTime<Utc>,
}

/// Database row for the `invites` table.
#[derive(Debug, Clone, FromRow)]
pub struct InviteRow {
    pub id: i64,
    pub share_id: i64,
    pub username: String,
    pub accepted: bool,
    pub invited_at: DateTime<Utc>,
    pub position: i32,
}

impl InviteRow {
    pub fn into_invite(self) -> StoreResult<Invite> {
        Ok(Invite {
            id: InviteId(self.id),
            user: Username::parse(&self.username).map_err(|e| StoreError::corrupt("invites", e))?,
            accepted: self.accepted,
            invited_at: self.invited_at,
        })
    }
}

impl ShareRow {
    /// Join a share row with its invites, which must already be in position order.
    pub fn into_record(self, invites: Vec<InviteRow>) -> StoreResult<ShareRecord> {
        let corrupt = |e: nbrepo_core::ValueError| StoreError::corrupt("shares", e);
        Ok(ShareRecord {
            id: ShareId(self.id),
            owner: Username::parse(&self.owner).map_err(corrupt)?,
            notebook_path: NotebookPath::parse(&self.notebook_path).map_err(corrupt)?,
            created: self.created,
            collaborators: invites
                .into_iter()
                .map(InviteRow::into_invite)
                .collect::<StoreResult<_>>()?,
        })
    }
}

/// One invited collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invite {
    pub id: InviteId,
    pub user: Username,
    pub accepted: bool,
    pub invited_at: DateTime<Utc>,
}

/// A privately shared notebook and its ordered collaborator list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareRecord {
    pub id: ShareId,
    pub owner: Username,
    pub notebook_path: NotebookPath,
    pub created: DateTime<Utc>,
    pub collaborators: Vec<Invite>,
}

impl ShareRecord {
    pub fn invite_for(&self, user: &Username) -> Option<&Invite> {
        self.collaborators.iter().find(|i| &i.user == user)
    }

    /// Owner or any invitee, accepted or not.
    pub fn involves(&self, user: &Username) -> bool {
        &self.owner == user || self.invite_for(user).is_some()
    }

    /// Owner followed by every invitee.
    pub fn participants(&self) -> Vec<Username> {
        std::iter::once(self.owner.clone())
            .chain(self.collaborators.iter().map(|i| i.user.clone()))
            .collect()
    }

    pub fn qualified_path(&self) -> String {
        self.notebook_path.qualified(&self.owner)
    }

    pub fn usernames(&self) -> Vec<Username> {
        self.collaborators.iter().map(|i| i.user.clone()).collect()
    }
}

/// Result of replacing a share's collaborator list.
#[derive(Debug, Clone)]
pub struct ShareUpdate {
    pub record: ShareRecord,
    /// True when this call created the share.
    pub created: bool,
    pub added: Vec<Username>,
    pub removed: Vec<Username>,
}

/// Result of removing one invite.
#[derive(Debug, Clone)]
pub enum DeclineOutcome {
    /// Other collaborators remain; carries the updated share.
    InviteRemoved(ShareRecord),
    /// That was the last collaborator; carries the share as it was before deletion.
    ShareDeleted(ShareRecord),
}

impl DeclineOutcome {
    pub fn record(&self) -> &ShareRecord {
        match self {
            Self::InviteRemoved(record) | Self::ShareDeleted(record) => record,
        }
    }
}

/// Shares a user takes part in, split by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserShares {
    pub shared_by_me: Vec<ShareRecord>,
    pub shared_with_me: Vec<ShareRecord>,
}

/// Which collaborators a replacement adds and drops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollaboratorPlan {
    /// New invitees in request order.
    pub added: Vec<Username>,
    /// Current invitees missing from the request, in their stored order.
    pub removed: Vec<Username>,
}

impl CollaboratorPlan {
    /// Diff the stored collaborator list against a requested one.
    ///
    /// Retained collaborators keep their position and acceptance state.
    pub fn diff(existing: &[Username], requested: &[Username]) -> Self {
        let mut added: Vec<Username> = Vec::new();
        for user in requested {
            if !existing.contains(user) && !added.contains(user) {
                added.push(user.clone());
            }
        }
        let removed = existing
            .iter()
            .filter(|user| !requested.contains(user))
            .cloned()
            .collect();
        Self { added, removed }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
