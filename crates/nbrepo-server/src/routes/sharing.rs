//! Sharing and presence routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use nbrepo_core::{InviteId, NotebookPath, ShareId};
use nbrepo_store::ShareRecord;

use crate::error::ApiResult;
use crate::extract::Caller;
use crate::sharing::{
    self, CurrentSharing, DeclineResult, HeartbeatReport, RunShared, ShareEntry, ShareRequest,
    SharingOverview,
};
use crate::state::AppState;

/// GET /sharing/list/ - Shares the caller owns and is invited to.
async fn list_shares(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<SharingOverview>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::list_for_user(&ctx).await?))
}

/// GET /sharing/current/{owner}/{path} - Current invitees of a notebook.
///
/// # Response
///
/// - 200 OK: `{ owner, notebook_path, share_id, users, editors }`
/// - 403 Forbidden: Caller is not part of the share
/// - 404 Not Found: Not shared and caller is not the owner
async fn current_sharing(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(qualified): Path<String>,
) -> ApiResult<Json<CurrentSharing>> {
    let (owner, path) = NotebookPath::split_qualified(&qualified)?;
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::current_sharing(&ctx, &owner, &path).await?))
}

/// POST /sharing/begin/ - Create or replace the caller's share of a notebook.
///
/// # Response
///
/// - 200 OK: The share after the change
/// - 400 Bad Request: No invitees, or unknown users (named in `users`)
async fn begin_share(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(request): Json<ShareRequest>,
) -> ApiResult<Json<ShareRecord>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::begin_share(&ctx, &request).await?))
}

/// PUT /sharing/{invite_id}/accept/
///
/// # Response
///
/// - 200 OK: The share as seen by the caller
/// - 403 Forbidden: Caller is not the invitee
/// - 404 Not Found: Invite no longer exists
async fn accept(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(invite_id): Path<InviteId>,
) -> ApiResult<Json<ShareEntry>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::accept(&ctx, invite_id).await?))
}

/// PUT /sharing/{invite_id}/decline/
///
/// # Response
///
/// - 200 OK: `{ share_id, share_deleted, share? }`
/// - 403 Forbidden: Caller is not the invitee
/// - 404 Not Found: Invite already accepted or gone
async fn decline(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(invite_id): Path<InviteId>,
) -> ApiResult<Json<DeclineResult>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::decline(&ctx, invite_id).await?))
}

/// PUT /sharing/{share_id}/copy - Pull into a directory named after the notebook.
async fn run_shared_default(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(share_id): Path<ShareId>,
) -> ApiResult<Json<RunShared>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::run_shared(&ctx, share_id, "").await?))
}

/// PUT /sharing/{share_id}/copy/{dir} - Pull the owner's notebook.
///
/// # Response
///
/// - 200 OK: `{ share_id, location }`
/// - 403 Forbidden: Invite not accepted yet
/// - 404 Not Found: Share removed
/// - 503 Service Unavailable: Workspace sync failed
async fn run_shared(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((share_id, dir)): Path<(ShareId, String)>,
) -> ApiResult<Json<RunShared>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::run_shared(&ctx, share_id, &dir).await?))
}

/// DELETE /sharing/{share_id}/remove/ - Make the notebook private again.
async fn remove_share(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(share_id): Path<ShareId>,
) -> ApiResult<Json<ShareRecord>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::remove_share(&ctx, share_id).await?))
}

/// PUT /sharing/heartbeat/{owner}/{path} - Liveness ping.
///
/// # Response
///
/// - 200 OK: `{ editors, window_secs, interval_secs }`
/// - 403 Forbidden: Caller is not part of the share
/// - 404 Not Found: Notebook is no longer shared
async fn heartbeat(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(qualified): Path<String>,
) -> ApiResult<Json<HeartbeatReport>> {
    let ctx = state.context(Some(identity));
    Ok(Json(sharing::heartbeat(&ctx, &qualified).await?))
}

/// Build sharing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sharing/list/", get(list_shares))
        .route("/sharing/current/{*path}", get(current_sharing))
        .route("/sharing/begin/", post(begin_share))
        .route("/sharing/{id}/accept/", put(accept))
        .route("/sharing/{id}/decline/", put(decline))
        .route("/sharing/{id}/copy", put(run_shared_default))
        .route("/sharing/{id}/copy/{*dir}", put(run_shared))
        .route("/sharing/{id}/remove/", delete(remove_share))
        .route("/sharing/heartbeat/{*path}", put(heartbeat))
}
