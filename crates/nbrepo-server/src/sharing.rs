//! Sharing coordinator and collaborative presence.
//!
//! A share is keyed by `(owner, notebook_path)` and exists only while it has
//! at least one invitee. Invites start pending; the invitee accepts or
//! declines, and declining the last invite deletes the share in the same
//! store transaction. Collaborators see the owner's edits by pulling
//! (`run_shared`), never by push.
//!
//! Heartbeats are advisory: they report who else has the notebook open and
//! never block a save.

use nbrepo_core::{InviteId, NotebookPath, ShareId, Username, slugify};
use nbrepo_store::{DeclineOutcome, ShareRecord};
use serde::{Deserialize, Serialize};

use crate::context::CoordinationContext;
use crate::error::{ApiError, ApiResult};
use crate::events::SharingAction;
use crate::presence::ActiveEditor;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Usernames as a JSON array or comma-separated text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserList {
    Items(Vec<String>),
    Text(String),
}

impl Default for UserList {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

impl UserList {
    fn pieces(&self) -> Vec<&str> {
        let items: Vec<&str> = match self {
            Self::Items(items) => items.iter().map(String::as_str).collect(),
            Self::Text(text) => vec![text.as_str()],
        };
        items
            .into_iter()
            .flat_map(|item| item.split(','))
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShareRequest {
    /// Notebook path inside the caller's workspace.
    pub notebook: String,
    #[serde(default)]
    pub share_with: UserList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRole {
    Owner,
    Collaborator,
}

/// A share as seen by one participant.
#[derive(Debug, Clone, Serialize)]
pub struct ShareEntry {
    pub share: ShareRecord,
    pub role: ShareRole,
    /// For a collaborator, their own invite state; for the owner, whether
    /// every invitee has accepted.
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<InviteId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharingOverview {
    pub shared_by_me: Vec<ShareEntry>,
    pub shared_with_me: Vec<ShareEntry>,
    /// Invites waiting on the caller's answer.
    pub pending_invites: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentSharing {
    pub owner: Username,
    pub notebook_path: NotebookPath,
    pub share_id: Option<ShareId>,
    pub users: Vec<Username>,
    /// Who has the notebook open right now.
    pub editors: Vec<ActiveEditor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeclineResult {
    pub share_id: ShareId,
    /// True when this was the last invite and the share is gone.
    pub share_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunShared {
    pub share_id: ShareId,
    /// Where to open the notebook, relative to the caller's workspace.
    pub location: NotebookPath,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatReport {
    /// Other users with the notebook open, by username.
    pub editors: Vec<ActiveEditor>,
    pub window_secs: i64,
    pub interval_secs: u64,
}

// ============================================================================
// Helpers
// ============================================================================

/// Trim, lowercase, validate and dedupe invitees, dropping the owner.
pub fn normalize_invitees(owner: &Username, requested: &UserList) -> ApiResult<Vec<Username>> {
    let mut invitees: Vec<Username> = Vec::new();
    for piece in requested.pieces() {
        let user = Username::parse(piece)?;
        if &user != owner && !invitees.contains(&user) {
            invitees.push(user);
        }
    }
    Ok(invitees)
}

fn entry_for(share: ShareRecord, user: &Username) -> ShareEntry {
    if &share.owner == user {
        let accepted = share.collaborators.iter().all(|i| i.accepted);
        return ShareEntry {
            share,
            role: ShareRole::Owner,
            accepted,
            invite_id: None,
        };
    }
    let (accepted, invite_id) = share
        .invite_for(user)
        .map(|invite| (invite.accepted, Some(invite.id)))
        .unwrap_or((false, None));
    ShareEntry {
        share,
        role: ShareRole::Collaborator,
        accepted,
        invite_id,
    }
}

async fn notify(ctx: &CoordinationContext, users: &[Username], share_id: ShareId, action: SharingAction) {
    ctx.events()
        .sharing_changed(users, share_id, action, ctx.now())
        .await;
}

// ============================================================================
// Operations
// ============================================================================

/// Create the caller's share of a notebook or replace its invitee list.
///
/// Invitees already on the share keep their acceptance state; new ones start
/// pending; ones left out are dropped. Unknown usernames reject the whole call.
pub async fn begin_share(ctx: &CoordinationContext, request: &ShareRequest) -> ApiResult<ShareRecord> {
    let caller = ctx.caller()?;
    let owner = &caller.username;
    let path = NotebookPath::parse(&request.notebook)?;

    let invitees = normalize_invitees(owner, &request.share_with)?;
    if invitees.is_empty() {
        return Err(ApiError::validation(
            "a notebook must be shared with at least one other user",
        ));
    }

    let unknown = ctx.store().unknown_users(&invitees).await?;
    if !unknown.is_empty() {
        tracing::info!(owner = %owner, unknown = unknown.len(), "Rejected share with unknown users");
        return Err(ApiError::Validation {
            message: "Unable to share with the indicated users".to_string(),
            users: unknown,
        });
    }

    let update = ctx
        .store()
        .replace_collaborators(owner, &path, &invitees, ctx.now())
        .await?;

    tracing::info!(
        share_id = %update.record.id,
        owner = %owner,
        path = %path,
        created = update.created,
        added = update.added.len(),
        removed = update.removed.len(),
        "Shared notebook"
    );

    let mut recipients = update.record.participants();
    recipients.extend(update.removed.iter().cloned());
    notify(ctx, &recipients, update.record.id, SharingAction::Shared).await;
    Ok(update.record)
}

/// Current invitees of `(owner, path)`, for pre-filling the share dialog.
///
/// A notebook that is not shared yields an empty list for its owner.
pub async fn current_sharing(
    ctx: &CoordinationContext,
    owner: &Username,
    path: &NotebookPath,
) -> ApiResult<CurrentSharing> {
    let caller = ctx.caller()?;
    let share = ctx.store().find_share(owner, path).await?;

    match &share {
        Some(share) if !share.involves(&caller.username) => {
            return Err(ApiError::Forbidden(
                "only the owner or a collaborator may view this share".into(),
            ));
        }
        None if !caller.is(owner) => {
            return Err(ApiError::NotFound(format!(
                "no share for '{}'",
                path.qualified(owner)
            )));
        }
        _ => {}
    }

    let editors = ctx
        .presence()
        .active_editors(&path.qualified(owner), ctx.now())
        .await;
    Ok(CurrentSharing {
        owner: owner.clone(),
        notebook_path: path.clone(),
        share_id: share.as_ref().map(|s| s.id),
        users: share.map(|s| s.usernames()).unwrap_or_default(),
        editors,
    })
}

/// Shares the caller owns and shares the caller is invited to.
pub async fn list_for_user(ctx: &CoordinationContext) -> ApiResult<SharingOverview> {
    let caller = ctx.caller()?;
    let user = &caller.username;
    let shares = ctx.store().list_shares_for_user(user).await?;

    let shared_by_me: Vec<ShareEntry> = shares
        .shared_by_me
        .into_iter()
        .map(|share| entry_for(share, user))
        .collect();
    let shared_with_me: Vec<ShareEntry> = shares
        .shared_with_me
        .into_iter()
        .map(|share| entry_for(share, user))
        .collect();
    let pending_invites = shared_with_me.iter().filter(|e| !e.accepted).count();

    tracing::debug!(
        user = %user,
        by_me = shared_by_me.len(),
        with_me = shared_with_me.len(),
        pending = pending_invites,
        "Listed shares"
    );
    Ok(SharingOverview {
        shared_by_me,
        shared_with_me,
        pending_invites,
    })
}

/// Load the share behind an invite and check the caller is its invitee.
async fn invite_of_caller(
    ctx: &CoordinationContext,
    invite_id: InviteId,
) -> ApiResult<(ShareRecord, bool)> {
    let caller = ctx.caller()?;
    let share = ctx.store().share_for_invite(invite_id).await?;
    let invite = share
        .collaborators
        .iter()
        .find(|i| i.id == invite_id)
        .ok_or_else(|| ApiError::NotFound(format!("invite {invite_id} not found")))?;
    if !caller.is(&invite.user) {
        return Err(ApiError::Forbidden(
            "only the invited user may answer an invitation".into(),
        ));
    }
    let accepted = invite.accepted;
    Ok((share, accepted))
}

/// Accept an invite. Accepting an accepted invite changes nothing.
pub async fn accept(ctx: &CoordinationContext, invite_id: InviteId) -> ApiResult<ShareEntry> {
    let caller = ctx.caller()?;
    let (share, already_accepted) = invite_of_caller(ctx, invite_id).await?;
    if already_accepted {
        return Ok(entry_for(share, &caller.username));
    }

    let share = ctx.store().accept_invite(invite_id).await?;
    tracing::info!(
        share_id = %share.id,
        invite_id = %invite_id,
        user = %caller.username,
        "Accepted invite"
    );
    notify(ctx, &share.participants(), share.id, SharingAction::Accepted).await;
    Ok(entry_for(share, &caller.username))
}

/// Decline a pending invite, deleting the share if it was the last one.
///
/// An accepted invite is resolved and can no longer be declined.
pub async fn decline(ctx: &CoordinationContext, invite_id: InviteId) -> ApiResult<DeclineResult> {
    let caller = ctx.caller()?;
    let (_, accepted) = invite_of_caller(ctx, invite_id).await?;
    if accepted {
        return Err(ApiError::NotFound(format!(
            "invite {invite_id} was already accepted"
        )));
    }

    let outcome = ctx.store().remove_invite(invite_id).await?;
    let share_id = outcome.record().id;
    let mut recipients = outcome.record().participants();
    if !recipients.contains(&caller.username) {
        recipients.push(caller.username.clone());
    }
    notify(ctx, &recipients, share_id, SharingAction::Declined).await;

    let result = match outcome {
        DeclineOutcome::InviteRemoved(share) => {
            tracing::info!(share_id = %share_id, user = %caller.username, "Declined invite");
            DeclineResult {
                share_id,
                share_deleted: false,
                share: Some(share),
            }
        }
        DeclineOutcome::ShareDeleted(_) => {
            tracing::info!(
                share_id = %share_id,
                user = %caller.username,
                "Declined last invite, share deleted"
            );
            DeclineResult {
                share_id,
                share_deleted: true,
                share: None,
            }
        }
    };
    Ok(result)
}

/// Make a notebook private again. Collaborators keep their local copies.
pub async fn remove_share(ctx: &CoordinationContext, share_id: ShareId) -> ApiResult<ShareRecord> {
    let share = ctx.store().get_share(share_id).await?;
    let caller = ctx.require_owner(&share.owner, "stop sharing this notebook")?;

    let share = ctx.store().delete_share(share_id).await?;
    tracing::info!(
        share_id = %share_id,
        owner = %caller.username,
        collaborators = share.collaborators.len(),
        "Removed share"
    );
    notify(ctx, &share.participants(), share_id, SharingAction::Removed).await;
    Ok(share)
}

/// Pull the owner's current notebook into the caller's workspace.
///
/// The owner opens the original in place; a collaborator must have accepted.
/// An empty `destination` means a directory named after the notebook.
pub async fn run_shared(
    ctx: &CoordinationContext,
    share_id: ShareId,
    destination: &str,
) -> ApiResult<RunShared> {
    let caller = ctx.caller()?;
    let share = ctx.store().get_share(share_id).await?;

    if caller.is(&share.owner) {
        return Ok(RunShared {
            share_id,
            location: share.notebook_path,
        });
    }
    match share.invite_for(&caller.username) {
        Some(invite) if invite.accepted => {}
        Some(_) => {
            return Err(ApiError::Forbidden(
                "accept the invitation before opening the notebook".into(),
            ));
        }
        None => {
            return Err(ApiError::Forbidden(
                "only the owner or a collaborator may open this notebook".into(),
            ));
        }
    }

    let destination = match NotebookPath::parse_optional(destination)? {
        Some(dir) => dir,
        None => {
            let file_name = share.notebook_path.file_name();
            let stem = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_name);
            NotebookPath::parse(&slugify(stem))?
        }
    };

    let location = ctx
        .workspace()
        .sync_shared(&share.owner, &share.notebook_path, &caller.username, &destination)
        .await?;
    tracing::info!(
        share_id = %share_id,
        user = %caller.username,
        location = %location,
        "Synced shared notebook"
    );
    Ok(RunShared { share_id, location })
}

/// Record the caller's presence on a shared notebook and report the others.
///
/// `qualified` is `{owner}/{notebook_path}`.
pub async fn heartbeat(ctx: &CoordinationContext, qualified: &str) -> ApiResult<HeartbeatReport> {
    let caller = ctx.caller()?;
    let (owner, path) = NotebookPath::split_qualified(qualified)?;
    let key = path.qualified(&owner);

    let Some(share) = ctx.store().find_share(&owner, &path).await? else {
        tracing::warn!(key = %key, user = %caller.username, "Heartbeat for a notebook that is not shared");
        return Err(ApiError::NotFound(format!("'{key}' is not shared")));
    };
    if !share.involves(&caller.username) {
        return Err(ApiError::Forbidden(
            "only the owner or a collaborator may edit this notebook".into(),
        ));
    }

    let editors = ctx
        .presence()
        .heartbeat(&key, &caller.username, ctx.now())
        .await;
    tracing::debug!(key = %key, user = %caller.username, others = editors.len(), "Heartbeat");

    Ok(HeartbeatReport {
        editors,
        window_secs: ctx.presence().window().num_seconds(),
        interval_secs: ctx.config().heartbeat_interval.as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::AppState;
    use nbrepo_core::{Identity, ManualClock};
    use nbrepo_store::Store;
    use std::sync::Arc;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn ctx(state: &AppState, name: &str) -> CoordinationContext {
        state.context(Some(Identity::new(user(name), false)))
    }

    async fn state_with_users(names: &[&str]) -> (AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let state = AppState::new(Store::in_memory(), ServerConfig::default()).with_clock(clock.clone());
        for name in names {
            state.store().upsert_user(&user(name), false).await.unwrap();
        }
        (state, clock)
    }

    fn request(notebook: &str, share_with: &[&str]) -> ShareRequest {
        ShareRequest {
            notebook: notebook.to_string(),
            share_with: UserList::Items(share_with.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_normalize_drops_owner_and_duplicates() {
        let owner = user("alice");
        let list = UserList::Text(" Bob, alice,,carol , BOB".into());
        let invitees = normalize_invitees(&owner, &list).unwrap();
        assert_eq!(invitees, vec![user("bob"), user("carol")]);
    }

    #[tokio::test]
    async fn test_share_accept_then_empty_rejected() {
        let (state, _) = state_with_users(&["alice", "bob"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");

        let share = begin_share(&alice, &request("proj.ipynb", &["bob"])).await.unwrap();
        let invite_id = share.collaborators[0].id;

        let entry = accept(&bob, invite_id).await.unwrap();
        assert!(entry.accepted);
        let again = accept(&bob, invite_id).await.unwrap();
        assert_eq!(again.share, entry.share);

        let overview = list_for_user(&bob).await.unwrap();
        assert_eq!(overview.shared_with_me.len(), 1);
        assert!(overview.shared_with_me[0].accepted);
        assert_eq!(overview.pending_invites, 0);

        let empty = begin_share(&alice, &request("proj.ipynb", &[])).await;
        assert!(matches!(empty, Err(ApiError::Validation { .. })));
        let only_self = begin_share(&alice, &request("proj.ipynb", &["alice"])).await;
        assert!(matches!(only_self, Err(ApiError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_unknown_users_named_and_nothing_written() {
        let (state, _) = state_with_users(&["alice", "bob"]).await;
        let alice = ctx(&state, "alice");

        let err = begin_share(&alice, &request("proj.ipynb", &["bob", "mallory", "eve"]))
            .await
            .unwrap_err();
        match err {
            ApiError::Validation { users, .. } => {
                assert_eq!(users, vec![user("mallory"), user("eve")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let current = current_sharing(&alice, &user("alice"), &NotebookPath::parse("proj.ipynb").unwrap())
            .await
            .unwrap();
        assert!(current.users.is_empty());
        assert_eq!(current.share_id, None);
    }

    #[tokio::test]
    async fn test_only_invitee_answers() {
        let (state, _) = state_with_users(&["alice", "bob", "carol"]).await;
        let alice = ctx(&state, "alice");
        let carol = ctx(&state, "carol");

        let share = begin_share(&alice, &request("proj.ipynb", &["bob"])).await.unwrap();
        let invite_id = share.collaborators[0].id;
        assert!(matches!(accept(&carol, invite_id).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(decline(&alice, invite_id).await, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_decline_after_accept_is_not_found() {
        let (state, _) = state_with_users(&["alice", "bob"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");

        let share = begin_share(&alice, &request("proj.ipynb", &["bob"])).await.unwrap();
        let invite_id = share.collaborators[0].id;
        accept(&bob, invite_id).await.unwrap();
        assert!(matches!(decline(&bob, invite_id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_declining_last_invite_deletes_share() {
        let (state, _) = state_with_users(&["alice", "bob", "carol"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");
        let carol = ctx(&state, "carol");

        let share = begin_share(&alice, &request("proj.ipynb", &["bob", "carol"])).await.unwrap();
        let bob_invite = share.invite_for(&user("bob")).unwrap().id;
        let carol_invite = share.invite_for(&user("carol")).unwrap().id;

        let first = decline(&bob, bob_invite).await.unwrap();
        assert!(!first.share_deleted);
        assert_eq!(first.share.unwrap().usernames(), vec![user("carol")]);

        let last = decline(&carol, carol_invite).await.unwrap();
        assert!(last.share_deleted);
        assert!(list_for_user(&alice).await.unwrap().shared_by_me.is_empty());
        assert!(matches!(decline(&carol, carol_invite).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_share_owner_only() {
        let (state, _) = state_with_users(&["alice", "bob"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");

        let share = begin_share(&alice, &request("proj.ipynb", &["bob"])).await.unwrap();
        assert!(matches!(remove_share(&bob, share.id).await, Err(ApiError::Forbidden(_))));
        remove_share(&alice, share.id).await.unwrap();
        assert!(matches!(remove_share(&alice, share.id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_run_shared_requires_acceptance() {
        let (state, _) = state_with_users(&["alice", "bob"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");

        let share = begin_share(&alice, &request("proj/demo.ipynb", &["bob"])).await.unwrap();
        let pending = run_shared(&bob, share.id, "").await;
        assert!(matches!(pending, Err(ApiError::Forbidden(_))));

        let own = run_shared(&alice, share.id, "").await.unwrap();
        assert_eq!(own.location.as_str(), "proj/demo.ipynb");
    }

    #[tokio::test]
    async fn test_heartbeat_lists_other_editor_within_window() {
        let (state, clock) = state_with_users(&["alice", "bob", "carol"]).await;
        let alice = ctx(&state, "alice");
        let bob = ctx(&state, "bob");
        let carol = ctx(&state, "carol");
        begin_share(&alice, &request("proj.ipynb", &["bob"])).await.unwrap();

        let first = heartbeat(&bob, "alice/proj.ipynb").await.unwrap();
        assert!(first.editors.is_empty());
        assert_eq!(first.window_secs, 120);
        assert_eq!(first.interval_secs, 60);

        clock.advance(chrono::Duration::seconds(10));
        let report = heartbeat(&alice, "alice/proj.ipynb").await.unwrap();
        assert_eq!(report.editors.len(), 1);
        assert_eq!(report.editors[0].user, user("bob"));

        clock.advance(chrono::Duration::seconds(200));
        let later = heartbeat(&alice, "alice/proj.ipynb").await.unwrap();
        assert!(later.editors.is_empty());

        assert!(matches!(
            heartbeat(&carol, "alice/proj.ipynb").await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            heartbeat(&bob, "alice/other.ipynb").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
