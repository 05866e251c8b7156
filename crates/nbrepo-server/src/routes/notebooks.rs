//! Public library routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use nbrepo_core::PublicationId;

use crate::error::ApiResult;
use crate::extract::{Caller, MaybeCaller};
use crate::library::{self, CopyOutcome, LibraryListing, Preview, PublicationForm, PublicationView};
use crate::state::AppState;

/// GET /notebooks/ - The public library.
///
/// # Response
///
/// - 200 OK: `{ publications, pinned, protected }`
async fn list_publications(
    State(state): State<AppState>,
    MaybeCaller(identity): MaybeCaller,
) -> ApiResult<Json<LibraryListing>> {
    let ctx = state.context(identity);
    Ok(Json(library::list(&ctx).await?))
}

/// POST /notebooks/ - Publish a notebook from the caller's workspace.
///
/// # Response
///
/// - 201 Created: The new publication
/// - 400 Bad Request: Missing or invalid metadata
/// - 403 Forbidden: Protected tag used by a non-admin
/// - 409 Conflict: Path already published by the caller
async fn publish(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(form): Json<PublicationForm>,
) -> ApiResult<(StatusCode, Json<PublicationView>)> {
    let ctx = state.context(Some(identity));
    let view = library::publish(&ctx, &form).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /notebooks/{id}/ - One publication.
async fn get_publication(
    State(state): State<AppState>,
    MaybeCaller(identity): MaybeCaller,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<PublicationView>> {
    let ctx = state.context(identity);
    Ok(Json(library::get(&ctx, id).await?))
}

/// PUT /notebooks/{id}/ - Replace a publication's metadata.
///
/// # Response
///
/// - 200 OK: The updated publication
/// - 403 Forbidden: Not the owner, or protected tag change by a non-admin
/// - 404 Not Found: Unknown id
async fn update_publication(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<PublicationId>,
    Json(form): Json<PublicationForm>,
) -> ApiResult<Json<PublicationView>> {
    let ctx = state.context(Some(identity));
    Ok(Json(library::update(&ctx, id, &form).await?))
}

/// DELETE /notebooks/{id}/ - Unpublish.
///
/// # Response
///
/// - 200 OK: The removed publication
/// - 403 Forbidden: Not the owner
/// - 404 Not Found: Unknown id
async fn unpublish(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<PublicationView>> {
    let ctx = state.context(Some(identity));
    Ok(Json(library::unpublish(&ctx, id).await?))
}

/// POST /notebooks/{id}/copy - Copy into a directory named after the notebook.
async fn copy_default(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<CopyOutcome>> {
    let ctx = state.context(Some(identity));
    Ok(Json(library::copy(&ctx, id, "").await?))
}

/// POST /notebooks/{id}/copy/{dir} - Copy into the caller's workspace.
///
/// # Response
///
/// - 200 OK: `{ publication_id, filename }`
/// - 400 Bad Request: Invalid destination
/// - 404 Not Found: Publication was unpublished
/// - 503 Service Unavailable: Workspace copy failed
async fn copy_into(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((id, dir)): Path<(PublicationId, String)>,
) -> ApiResult<Json<CopyOutcome>> {
    let ctx = state.context(Some(identity));
    Ok(Json(library::copy(&ctx, id, &dir).await?))
}

/// GET /notebooks/{id}/preview/ - Read-only rendering link. Public.
async fn preview(
    State(state): State<AppState>,
    MaybeCaller(identity): MaybeCaller,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<Preview>> {
    let ctx = state.context(identity);
    Ok(Json(library::preview(&ctx, id).await?))
}

/// PUT /notebooks/{id}/launched/ - Count a launch.
async fn launched(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<PublicationId>,
) -> ApiResult<Json<PublicationView>> {
    let ctx = state.context(Some(identity));
    Ok(Json(library::launched(&ctx, id).await?))
}

/// Build library routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notebooks/", get(list_publications).post(publish))
        .route(
            "/notebooks/{id}/",
            get(get_publication).put(update_publication).delete(unpublish),
        )
        .route("/notebooks/{id}/copy", post(copy_default))
        .route("/notebooks/{id}/copy/{*dir}", post(copy_into))
        .route("/notebooks/{id}/preview/", get(preview))
        .route("/notebooks/{id}/launched/", put(launched))
}
