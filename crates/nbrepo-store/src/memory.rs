//! In-process backend.
//!
//! Used by tests and single-node development runs. One mutex guards the
//! whole state, so every operation is atomic with respect to every other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nbrepo_core::{
    InviteId, NotebookPath, PublicationId, ShareId, TagId, TagLabel, Username,
};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::*;

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<Username, UserRecord>,
    publications: BTreeMap<PublicationId, PublicationRecord>,
    tags: BTreeMap<TagId, TagRecord>,
    shares: BTreeMap<ShareId, ShareRecord>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn tag_by_label(&self, label: &TagLabel) -> Option<&TagRecord> {
        self.tags.values().find(|t| &t.label == label)
    }

    fn ensure_tags(&mut self, labels: &[TagLabel]) -> Vec<TagLabel> {
        let mut created = Vec::new();
        for label in labels {
            if self.tag_by_label(label).is_none() {
                let id = TagId(self.next_id());
                self.tags.insert(
                    id,
                    TagRecord {
                        id,
                        label: label.clone(),
                        description: String::new(),
                        pinned: false,
                        protected: false,
                    },
                );
                created.push(label.clone());
            }
        }
        created
    }

    fn share_holding(&self, invite: InviteId) -> Option<ShareId> {
        self.shares
            .values()
            .find(|s| s.collaborators.iter().any(|i| i.id == invite))
            .map(|s| s.id)
    }
}

fn sorted_labels(labels: &[TagLabel]) -> Vec<TagLabel> {
    let mut sorted: Vec<TagLabel> = Vec::new();
    for label in labels {
        if !sorted.contains(label) {
            sorted.push(label.clone());
        }
    }
    sorted.sort();
    sorted
}

/// Memory-backed store state.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    // ==================== User Operations ====================

    pub(crate) async fn upsert_user(&self, username: &Username, admin: bool) -> UserRecord {
        let mut state = self.state.lock().await;
        let record = state
            .users
            .entry(username.clone())
            .or_insert_with(|| UserRecord {
                username: username.clone(),
                admin,
                created: Utc::now(),
            });
        record.admin = admin;
        record.clone()
    }

    pub(crate) async fn get_user(&self, username: &Username) -> Option<UserRecord> {
        self.state.lock().await.users.get(username).cloned()
    }

    pub(crate) async fn unknown_users(&self, users: &[Username]) -> Vec<Username> {
        let state = self.state.lock().await;
        users
            .iter()
            .filter(|u| !state.users.contains_key(*u))
            .cloned()
            .collect()
    }

    // ==================== Publication Operations ====================

    pub(crate) async fn insert_publication(
        &self,
        new: &NewPublication,
        now: DateTime<Utc>,
    ) -> StoreResult<PublicationRecord> {
        let mut state = self.state.lock().await;
        let taken = state
            .publications
            .values()
            .any(|p| p.owner == new.owner && p.api_path == new.api_path);
        if taken {
            return Err(StoreError::DuplicatePublication {
                owner: new.owner.clone(),
                api_path: new.api_path.clone(),
            });
        }

        let meta = &new.metadata;
        state.ensure_tags(&meta.tags);
        let id = PublicationId(state.next_id());
        let record = PublicationRecord {
            id,
            owner: new.owner.clone(),
            api_path: new.api_path.clone(),
            file_path: new.file_path.clone(),
            name: meta.name.clone(),
            description: meta.description.clone(),
            author: meta.author.clone(),
            quality: meta.quality,
            citation: meta.citation.clone(),
            tags: sorted_labels(&meta.tags),
            copied: 0,
            launched: 0,
            publication_date: now,
            updated: now,
        };
        state.publications.insert(id, record.clone());
        Ok(record)
    }

    pub(crate) async fn get_publication(&self, id: PublicationId) -> StoreResult<PublicationRecord> {
        self.state
            .lock()
            .await
            .publications
            .get(&id)
            .cloned()
            .ok_or(StoreError::PublicationNotFound(id))
    }

    pub(crate) async fn publication_exists(&self, owner: &Username, api_path: &NotebookPath) -> bool {
        self.state
            .lock()
            .await
            .publications
            .values()
            .any(|p| &p.owner == owner && &p.api_path == api_path)
    }

    pub(crate) async fn list_publications(&self) -> Vec<PublicationRecord> {
        self.state.lock().await.publications.values().cloned().collect()
    }

    pub(crate) async fn replace_publication(
        &self,
        id: PublicationId,
        meta: &PublicationMetadata,
        now: DateTime<Utc>,
    ) -> StoreResult<PublicationRecord> {
        let mut state = self.state.lock().await;
        if !state.publications.contains_key(&id) {
            return Err(StoreError::PublicationNotFound(id));
        }
        state.ensure_tags(&meta.tags);
        let record = state
            .publications
            .get_mut(&id)
            .ok_or(StoreError::PublicationNotFound(id))?;
        record.name = meta.name.clone();
        record.description = meta.description.clone();
        record.author = meta.author.clone();
        record.quality = meta.quality;
        record.citation = meta.citation.clone();
        record.tags = sorted_labels(&meta.tags);
        record.updated = now;
        Ok(record.clone())
    }

    pub(crate) async fn delete_publication(&self, id: PublicationId) -> StoreResult<PublicationRecord> {
        self.state
            .lock()
            .await
            .publications
            .remove(&id)
            .ok_or(StoreError::PublicationNotFound(id))
    }

    pub(crate) async fn increment_counter(
        &self,
        id: PublicationId,
        counter: Counter,
    ) -> StoreResult<PublicationRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .publications
            .get_mut(&id)
            .ok_or(StoreError::PublicationNotFound(id))?;
        match counter {
            Counter::Copied => record.copied += 1,
            Counter::Launched => record.launched += 1,
        }
        Ok(record.clone())
    }

    // ==================== Tag Operations ====================

    pub(crate) async fn ensure_tags(&self, labels: &[TagLabel]) -> Vec<TagLabel> {
        self.state.lock().await.ensure_tags(labels)
    }

    pub(crate) async fn list_tags(&self) -> Vec<TagRecord> {
        let mut tags: Vec<TagRecord> = self.state.lock().await.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        tags
    }

    pub(crate) async fn tags_by_label(&self, labels: &[TagLabel]) -> Vec<TagRecord> {
        let mut tags: Vec<TagRecord> = self
            .state
            .lock()
            .await
            .tags
            .values()
            .filter(|t| labels.contains(&t.label))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.label.cmp(&b.label));
        tags
    }

    pub(crate) async fn update_tag(&self, id: TagId, changes: &TagChanges) -> StoreResult<TagRecord> {
        let mut state = self.state.lock().await;
        let tag = state.tags.get_mut(&id).ok_or(StoreError::TagNotFound(id))?;
        changes.apply(tag);
        Ok(tag.clone())
    }

    pub(crate) async fn upsert_tag(
        &self,
        label: &TagLabel,
        changes: &TagChanges,
    ) -> StoreResult<(TagRecord, bool)> {
        let mut state = self.state.lock().await;
        let created = !state.ensure_tags(std::slice::from_ref(label)).is_empty();
        let tag = state
            .tags
            .values_mut()
            .find(|t| &t.label == label)
            .ok_or_else(|| StoreError::corrupt("tags", "label vanished after upsert"))?;
        changes.apply(tag);
        Ok((tag.clone(), created))
    }

    // ==================== Share Operations ====================

    pub(crate) async fn replace_collaborators(
        &self,
        owner: &Username,
        path: &NotebookPath,
        requested: &[Username],
        now: DateTime<Utc>,
    ) -> StoreResult<ShareUpdate> {
        let mut state = self.state.lock().await;

        let existing = state
            .shares
            .values()
            .find(|s| &s.owner == owner && &s.notebook_path == path)
            .cloned();
        let created = existing.is_none();
        let mut record = match existing {
            Some(record) => record,
            None => ShareRecord {
                id: ShareId(state.next_id()),
                owner: owner.clone(),
                notebook_path: path.clone(),
                created: now,
                collaborators: Vec::new(),
            },
        };

        let plan = CollaboratorPlan::diff(&record.usernames(), requested);
        record.collaborators.retain(|i| !plan.removed.contains(&i.user));
        for user in &plan.added {
            let id = InviteId(state.next_id());
            record.collaborators.push(Invite {
                id,
                user: user.clone(),
                accepted: false,
                invited_at: now,
            });
        }
        if record.collaborators.is_empty() {
            return Err(StoreError::EmptyCollaborators);
        }

        state.shares.insert(record.id, record.clone());
        Ok(ShareUpdate {
            record,
            created,
            added: plan.added,
            removed: plan.removed,
        })
    }

    pub(crate) async fn get_share(&self, id: ShareId) -> StoreResult<ShareRecord> {
        self.state
            .lock()
            .await
            .shares
            .get(&id)
            .cloned()
            .ok_or(StoreError::ShareNotFound(id))
    }

    pub(crate) async fn find_share(&self, owner: &Username, path: &NotebookPath) -> Option<ShareRecord> {
        self.state
            .lock()
            .await
            .shares
            .values()
            .find(|s| &s.owner == owner && &s.notebook_path == path)
            .cloned()
    }

    pub(crate) async fn list_shares_for_user(&self, user: &Username) -> UserShares {
        let state = self.state.lock().await;
        let mut shares: Vec<&ShareRecord> = state.shares.values().collect();
        shares.sort_by_key(|s| (s.created, s.id));
        UserShares {
            shared_by_me: shares
                .iter()
                .filter(|s| &s.owner == user)
                .map(|s| (*s).clone())
                .collect(),
            shared_with_me: shares
                .iter()
                .filter(|s| s.invite_for(user).is_some())
                .map(|s| (*s).clone())
                .collect(),
        }
    }

    pub(crate) async fn share_for_invite(&self, invite: InviteId) -> StoreResult<ShareRecord> {
        let state = self.state.lock().await;
        state
            .share_holding(invite)
            .and_then(|id| state.shares.get(&id).cloned())
            .ok_or(StoreError::InviteNotFound(invite))
    }

    pub(crate) async fn accept_invite(&self, invite: InviteId) -> StoreResult<ShareRecord> {
        let mut state = self.state.lock().await;
        let share_id = state
            .share_holding(invite)
            .ok_or(StoreError::InviteNotFound(invite))?;
        let record = state
            .shares
            .get_mut(&share_id)
            .ok_or(StoreError::InviteNotFound(invite))?;
        for entry in record.collaborators.iter_mut().filter(|i| i.id == invite) {
            entry.accepted = true;
        }
        Ok(record.clone())
    }

    pub(crate) async fn remove_invite(&self, invite: InviteId) -> StoreResult<DeclineOutcome> {
        let mut state = self.state.lock().await;
        let share_id = state
            .share_holding(invite)
            .ok_or(StoreError::InviteNotFound(invite))?;
        let record = state
            .shares
            .get_mut(&share_id)
            .ok_or(StoreError::InviteNotFound(invite))?;

        if record.collaborators.len() <= 1 {
            let before = record.clone();
            state.shares.remove(&share_id);
            return Ok(DeclineOutcome::ShareDeleted(before));
        }
        record.collaborators.retain(|i| i.id != invite);
        Ok(DeclineOutcome::InviteRemoved(record.clone()))
    }

    pub(crate) async fn delete_share(&self, id: ShareId) -> StoreResult<ShareRecord> {
        self.state
            .lock()
            .await
            .shares
            .remove(&id)
            .ok_or(StoreError::ShareNotFound(id))
    }
}
