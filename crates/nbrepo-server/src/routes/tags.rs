//! Tag routes. Listing is public; changes are admin-only.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use nbrepo_core::{TagId, TagLabel};
use nbrepo_store::{TagChanges, TagRecord};

use crate::error::ApiResult;
use crate::extract::{Caller, MaybeCaller};
use crate::state::AppState;
use crate::tags;

/// GET /tags/ - All tags with their flags.
async fn list_tags(
    State(state): State<AppState>,
    MaybeCaller(identity): MaybeCaller,
) -> ApiResult<Json<Vec<TagRecord>>> {
    let ctx = state.context(identity);
    Ok(Json(tags::list(&ctx).await?))
}

/// PUT /tags/{id}/ - Change pinned/protected/description.
///
/// # Response
///
/// - 200 OK: The updated tag
/// - 400 Bad Request: Empty change set
/// - 403 Forbidden: Caller is not an admin
/// - 404 Not Found: Unknown tag id
async fn update_tag(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<TagId>,
    Json(changes): Json<TagChanges>,
) -> ApiResult<Json<TagRecord>> {
    let ctx = state.context(Some(identity));
    Ok(Json(tags::update_by_id(&ctx, id, &changes).await?))
}

/// PUT /tags/label/{label}/ - Same as above, addressed by label; creates the tag if unseen.
async fn upsert_tag(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(label): Path<String>,
    Json(changes): Json<TagChanges>,
) -> ApiResult<Json<TagRecord>> {
    let label = TagLabel::parse(&label)?;
    let ctx = state.context(Some(identity));
    Ok(Json(tags::upsert_by_label(&ctx, &label, &changes).await?))
}

/// Build tag routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tags/", get(list_tags))
        .route("/tags/{id}/", put(update_tag))
        .route("/tags/label/{label}/", put(upsert_tag))
}
