//! Publication registry: the public library of notebooks.
//!
//! A publication is keyed by `(owner, api_path)` and carries the metadata a
//! publisher fills in. Updates replace every mutable field (last write wins);
//! copies are delegated to the workspace collaborator and counted here.

use std::collections::BTreeSet;

use nbrepo_core::{NotebookPath, PublicationId, Quality, TagLabel, parse_label_list, slugify};
use nbrepo_store::{Counter, NewPublication, PublicationMetadata, PublicationRecord, StoreError};
use serde::{Deserialize, Serialize};

use crate::context::CoordinationContext;
use crate::error::{ApiError, ApiResult};
use crate::events::LibraryAction;
use crate::tags;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_AUTHOR_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 256;
pub const MAX_CITATION_LEN: usize = 511;

// ============================================================================
// Request / Response Types
// ============================================================================

/// A tag list as either a JSON array or comma-separated text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LabelList {
    Items(Vec<String>),
    Text(String),
}

impl LabelList {
    pub fn parse(&self) -> Result<Vec<TagLabel>, nbrepo_core::ValueError> {
        match self {
            Self::Items(items) => parse_label_list(items.iter().map(String::as_str)),
            Self::Text(text) => parse_label_list([text.as_str()]),
        }
    }
}

impl Default for LabelList {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

/// Publisher-supplied fields for publish and update.
///
/// `api_path` and `file_path` are read on publish only; they cannot change
/// afterwards.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PublicationForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default)]
    pub tags: LabelList,
}

/// A publication as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct PublicationView {
    #[serde(flatten)]
    pub record: PublicationRecord,
    pub url: String,
}

impl From<PublicationRecord> for PublicationView {
    fn from(record: PublicationRecord) -> Self {
        let url = publication_url(record.id);
        Self { record, url }
    }
}

/// The public library plus the label sets clients group by.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryListing {
    pub publications: Vec<PublicationView>,
    pub pinned: Vec<TagLabel>,
    pub protected: Vec<TagLabel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyOutcome {
    pub publication_id: PublicationId,
    /// New file, relative to the caller's workspace.
    pub filename: NotebookPath,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub id: PublicationId,
    pub name: String,
    pub author: String,
    pub description: String,
    pub quality: Quality,
    pub tags: Vec<TagLabel>,
    pub render_url: String,
}

pub fn publication_url(id: PublicationId) -> String {
    format!("/notebooks/{id}/")
}

// ============================================================================
// Validation
// ============================================================================

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_len(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Validate the metadata fields of a form.
///
/// Every missing required field is named in one error.
pub fn validate_metadata(form: &PublicationForm) -> ApiResult<PublicationMetadata> {
    let name = present(&form.name);
    let author = present(&form.author);
    let quality = present(&form.quality);

    let missing: Vec<&str> = [("name", name), ("author", author), ("quality", quality)]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(field, _)| field)
        .collect();
    let (Some(name), Some(author), Some(quality)) = (name, author, quality) else {
        return Err(ApiError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    };

    check_len("name", name, MAX_NAME_LEN)?;
    check_len("author", author, MAX_AUTHOR_LEN)?;
    let description = present(&form.description).unwrap_or_default();
    check_len("description", description, MAX_DESCRIPTION_LEN)?;
    let citation = present(&form.citation);
    if let Some(citation) = citation {
        check_len("citation", citation, MAX_CITATION_LEN)?;
    }

    Ok(PublicationMetadata {
        name: name.to_string(),
        description: description.to_string(),
        author: author.to_string(),
        quality: quality.parse()?,
        citation: citation.map(str::to_string),
        tags: form.tags.parse()?,
    })
}

// ============================================================================
// Operations
// ============================================================================

/// Every publication by ascending id, with the pinned and protected labels.
pub async fn list(ctx: &CoordinationContext) -> ApiResult<LibraryListing> {
    let publications = ctx.store().list_publications().await?;
    let tags = ctx.store().list_tags().await?;

    let pinned: BTreeSet<TagLabel> = tags.iter().filter(|t| t.pinned).map(|t| t.label.clone()).collect();
    let protected: BTreeSet<TagLabel> =
        tags.iter().filter(|t| t.protected).map(|t| t.label.clone()).collect();

    tracing::debug!(count = publications.len(), "Listed publications");
    Ok(LibraryListing {
        publications: publications.into_iter().map(PublicationView::from).collect(),
        pinned: pinned.into_iter().collect(),
        protected: protected.into_iter().collect(),
    })
}

pub async fn get(ctx: &CoordinationContext, id: PublicationId) -> ApiResult<PublicationView> {
    Ok(ctx.store().get_publication(id).await?.into())
}

/// Publish a notebook from the caller's workspace.
///
/// Fails with `Conflict` when the caller already published the same path.
pub async fn publish(ctx: &CoordinationContext, form: &PublicationForm) -> ApiResult<PublicationView> {
    let caller = ctx.caller()?;
    let api_path = present(&form.api_path)
        .ok_or_else(|| ApiError::validation("missing required fields: api_path"))?;
    let api_path = NotebookPath::parse(api_path)?;
    let file_path = match present(&form.file_path) {
        Some(raw) => NotebookPath::parse(raw)?,
        None => api_path.clone(),
    };
    let metadata = validate_metadata(form)?;

    tags::check_protected(ctx, &[], &metadata.tags).await?;
    // A rejected duplicate must not leave tag rows behind.
    if ctx.store().publication_exists(&caller.username, &api_path).await? {
        return Err(StoreError::DuplicatePublication {
            owner: caller.username.clone(),
            api_path,
        }
        .into());
    }
    tags::ensure_tags(ctx, &metadata.tags).await?;

    let new = NewPublication {
        owner: caller.username.clone(),
        api_path,
        file_path: file_path.to_string(),
        metadata,
    };
    let record = ctx.store().insert_publication(&new, ctx.now()).await?;

    tracing::info!(
        publication_id = %record.id,
        owner = %record.owner,
        api_path = %record.api_path,
        "Published notebook"
    );
    ctx.events()
        .library_changed(record.id, LibraryAction::Published, ctx.now())
        .await;
    Ok(record.into())
}

/// Replace the metadata of the caller's publication.
pub async fn update(
    ctx: &CoordinationContext,
    id: PublicationId,
    form: &PublicationForm,
) -> ApiResult<PublicationView> {
    let existing = ctx.store().get_publication(id).await?;
    ctx.require_owner(&existing.owner, "update this publication")?;
    let metadata = validate_metadata(form)?;

    tags::check_protected(ctx, &existing.tags, &metadata.tags).await?;
    tags::ensure_tags(ctx, &metadata.tags).await?;

    let record = ctx.store().replace_publication(id, &metadata, ctx.now()).await?;
    tracing::info!(publication_id = %id, owner = %record.owner, "Updated publication");
    ctx.events()
        .library_changed(id, LibraryAction::Updated, ctx.now())
        .await;
    Ok(record.into())
}

/// Remove the caller's publication from the library.
pub async fn unpublish(ctx: &CoordinationContext, id: PublicationId) -> ApiResult<PublicationView> {
    let existing = ctx.store().get_publication(id).await?;
    ctx.require_owner(&existing.owner, "unpublish this notebook")?;

    let record = ctx.store().delete_publication(id).await?;
    tracing::info!(publication_id = %id, owner = %record.owner, "Unpublished notebook");
    ctx.events()
        .library_changed(id, LibraryAction::Unpublished, ctx.now())
        .await;
    Ok(record.into())
}

/// Copy a published notebook into the caller's workspace.
///
/// An empty `destination` means a directory named after the publication.
pub async fn copy(
    ctx: &CoordinationContext,
    id: PublicationId,
    destination: &str,
) -> ApiResult<CopyOutcome> {
    let caller = ctx.caller()?;
    let record = ctx.store().get_publication(id).await?;

    let destination = match NotebookPath::parse_optional(destination)? {
        Some(dir) => dir,
        None => NotebookPath::parse(&slugify(&record.name))?,
    };
    let source = NotebookPath::parse(&record.file_path)?;

    let filename = ctx
        .workspace()
        .copy_into(&record.owner, &source, &caller.username, &destination)
        .await?;
    ctx.store().increment_counter(id, Counter::Copied).await?;

    tracing::info!(
        publication_id = %id,
        user = %caller.username,
        filename = %filename,
        "Copied publication into workspace"
    );
    ctx.events()
        .library_changed(id, LibraryAction::Copied, ctx.now())
        .await;
    Ok(CopyOutcome {
        publication_id: id,
        filename,
    })
}

/// Read-only rendering details. Public.
pub async fn preview(ctx: &CoordinationContext, id: PublicationId) -> ApiResult<Preview> {
    let record = ctx.store().get_publication(id).await?;
    let base = ctx.config().preview_base_url.trim_end_matches('/');
    Ok(Preview {
        id: record.id,
        render_url: format!("{}/{}", base, record.api_path.qualified(&record.owner)),
        name: record.name,
        author: record.author,
        description: record.description,
        quality: record.quality,
        tags: record.tags,
    })
}

/// Count one launch of a publication.
pub async fn launched(ctx: &CoordinationContext, id: PublicationId) -> ApiResult<PublicationView> {
    let caller = ctx.caller()?;
    let record = ctx.store().increment_counter(id, Counter::Launched).await?;
    tracing::debug!(publication_id = %id, user = %caller.username, launched = record.launched, "Counted launch");
    Ok(record.into())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::AppState;
    use nbrepo_core::{Identity, Username};
    use nbrepo_store::Store;

    fn form(api_path: &str, name: &str, tags: &[&str]) -> PublicationForm {
        PublicationForm {
            api_path: Some(api_path.to_string()),
            name: Some(name.to_string()),
            author: Some("Alice A.".to_string()),
            quality: Some("beta".to_string()),
            description: Some("A demo".to_string()),
            tags: LabelList::Items(tags.iter().map(|t| t.to_string()).collect()),
            ..PublicationForm::default()
        }
    }

    fn ctx(state: &AppState, name: &str, admin: bool) -> CoordinationContext {
        state.context(Some(Identity::new(Username::parse(name).unwrap(), admin)))
    }

    fn state() -> AppState {
        AppState::new(Store::in_memory(), ServerConfig::default())
    }

    #[test]
    fn test_label_list_forms() {
        let csv: LabelList = serde_json::from_str("\"a, b,a\"").unwrap();
        assert_eq!(csv.parse().unwrap().len(), 2);
        let items: LabelList = serde_json::from_str("[\"A\", \"c\"]").unwrap();
        let labels = items.parse().unwrap();
        assert_eq!(labels[0].as_str(), "a");
    }

    #[test]
    fn test_missing_fields_all_named() {
        let err = validate_metadata(&PublicationForm {
            name: Some("  ".into()),
            ..PublicationForm::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "missing required fields: name, author, quality");
    }

    #[test]
    fn test_metadata_limits() {
        let mut f = form("demo.ipynb", &"n".repeat(65), &[]);
        assert!(validate_metadata(&f).is_err());
        f.name = Some("ok".into());
        f.quality = Some("alpha".into());
        assert!(matches!(validate_metadata(&f), Err(ApiError::Validation { .. })));
        f.quality = Some("RELEASE".into());
        assert_eq!(validate_metadata(&f).unwrap().quality, Quality::Release);
    }

    #[tokio::test]
    async fn test_publish_then_duplicate_conflicts() {
        let state = state();
        let alice = ctx(&state, "alice", false);

        let view = publish(&alice, &form("alice/demo.ipynb", "Demo", &[])).await.unwrap();
        assert_eq!(view.record.name, "Demo");
        assert_eq!(view.url, format!("/notebooks/{}/", view.record.id));

        let again = publish(&alice, &form("alice/demo.ipynb", "Demo 2", &["fresh-label"])).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));
        let tags = alice.store().list_tags().await.unwrap();
        assert!(tags.iter().all(|t| t.label.as_str() != "fresh-label"));

        let listing = list(&alice).await.unwrap();
        assert_eq!(listing.publications.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_unpublish_are_owner_only() {
        let state = state();
        let alice = ctx(&state, "alice", false);
        let bob = ctx(&state, "bob", false);
        let id = publish(&alice, &form("demo.ipynb", "Demo", &[])).await.unwrap().record.id;

        let result = update(&bob, id, &form("demo.ipynb", "Hijacked", &[])).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert!(matches!(unpublish(&bob, id).await, Err(ApiError::Forbidden(_))));

        let updated = update(&alice, id, &form("ignored.ipynb", "Renamed", &["new-tag"])).await.unwrap();
        assert_eq!(updated.record.name, "Renamed");
        assert_eq!(updated.record.api_path.as_str(), "demo.ipynb");

        unpublish(&alice, id).await.unwrap();
        assert!(matches!(get(&alice, id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_publish_registers_tags() {
        let state = state();
        let alice = ctx(&state, "alice", false);
        publish(&alice, &form("demo.ipynb", "Demo", &["rna-seq", "demo"])).await.unwrap();

        let tags = tags::list(&alice).await.unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[tokio::test]
    async fn test_protected_label_on_publish() {
        let state = state();
        let root = ctx(&state, "root", true);
        let bob = ctx(&state, "bob", false);
        tags::protect(&root, &TagLabel::parse("curated").unwrap()).await.unwrap();

        let denied = publish(&bob, &form("x.ipynb", "X", &["curated"])).await;
        assert!(matches!(denied, Err(ApiError::Forbidden(_))));

        let allowed = publish(&root, &form("x.ipynb", "X", &["curated"])).await.unwrap();
        let listing = list(&bob).await.unwrap();
        assert_eq!(listing.protected[0].as_str(), "curated");
        assert_eq!(listing.publications[0].record.id, allowed.record.id);
    }

    #[tokio::test]
    async fn test_preview_link() {
        let state = state();
        let alice = ctx(&state, "alice", false);
        let id = publish(&alice, &form("proj/demo.ipynb", "Demo", &[])).await.unwrap().record.id;

        let anonymous = state.context(None);
        let preview = preview(&anonymous, id).await.unwrap();
        assert_eq!(preview.render_url, "/previews/alice/proj/demo.ipynb");
        assert_eq!(preview.quality, Quality::Beta);
    }

    #[tokio::test]
    async fn test_launch_counter() {
        let state = state();
        let alice = ctx(&state, "alice", false);
        let id = publish(&alice, &form("demo.ipynb", "Demo", &[])).await.unwrap().record.id;
        launched(&alice, id).await.unwrap();
        let view = launched(&alice, id).await.unwrap();
        assert_eq!(view.record.launched, 2);
    }
}
