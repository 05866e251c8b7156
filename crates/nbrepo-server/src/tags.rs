//! Tag governance.
//!
//! Tags come into existence the first time a publication uses a label, with
//! both flags off. Admins then pin labels (navigation categories) and protect
//! them (reserved vocabulary only admins may attach or detach).

use std::collections::BTreeSet;

use nbrepo_core::{TagId, TagLabel};
use nbrepo_store::{TagChanges, TagRecord};

use crate::context::CoordinationContext;
use crate::error::{ApiError, ApiResult};

/// Flags that admin toggles act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFlag {
    Pinned,
    Protected,
}

impl TagFlag {
    fn changes(self, value: bool) -> TagChanges {
        match self {
            Self::Pinned => TagChanges {
                pinned: Some(value),
                ..TagChanges::default()
            },
            Self::Protected => TagChanges {
                protected: Some(value),
                ..TagChanges::default()
            },
        }
    }
}

/// All tags, by label. Public.
pub async fn list(ctx: &CoordinationContext) -> ApiResult<Vec<TagRecord>> {
    let tags = ctx.store().list_tags().await?;
    tracing::debug!(count = tags.len(), "Listed tags");
    Ok(tags)
}

/// Admin: change flags on an existing tag row.
pub async fn update_by_id(
    ctx: &CoordinationContext,
    id: TagId,
    changes: &TagChanges,
) -> ApiResult<TagRecord> {
    let admin = ctx.admin()?;
    if changes.is_empty() {
        return Err(ApiError::validation("no tag changes given"));
    }
    let tag = ctx.store().update_tag(id, changes).await?;
    tracing::info!(
        tag_id = %id,
        label = %tag.label,
        pinned = tag.pinned,
        protected = tag.protected,
        admin = %admin.username,
        "Updated tag"
    );
    Ok(tag)
}

/// Admin: change flags on the tag with this label, creating it if unseen.
pub async fn upsert_by_label(
    ctx: &CoordinationContext,
    label: &TagLabel,
    changes: &TagChanges,
) -> ApiResult<TagRecord> {
    let admin = ctx.admin()?;
    if changes.is_empty() {
        return Err(ApiError::validation("no tag changes given"));
    }
    let (tag, created) = ctx.store().upsert_tag(label, changes).await?;
    if created {
        tracing::info!(label = %label, admin = %admin.username, "Created tag");
    }
    tracing::info!(
        label = %label,
        pinned = tag.pinned,
        protected = tag.protected,
        admin = %admin.username,
        "Updated tag"
    );
    Ok(tag)
}

/// Admin: turn one flag on or off for a label.
pub async fn set_flag(
    ctx: &CoordinationContext,
    label: &TagLabel,
    flag: TagFlag,
    value: bool,
) -> ApiResult<TagRecord> {
    upsert_by_label(ctx, label, &flag.changes(value)).await
}

pub async fn pin(ctx: &CoordinationContext, label: &TagLabel) -> ApiResult<TagRecord> {
    set_flag(ctx, label, TagFlag::Pinned, true).await
}

pub async fn unpin(ctx: &CoordinationContext, label: &TagLabel) -> ApiResult<TagRecord> {
    set_flag(ctx, label, TagFlag::Pinned, false).await
}

pub async fn protect(ctx: &CoordinationContext, label: &TagLabel) -> ApiResult<TagRecord> {
    set_flag(ctx, label, TagFlag::Protected, true).await
}

pub async fn unprotect(ctx: &CoordinationContext, label: &TagLabel) -> ApiResult<TagRecord> {
    set_flag(ctx, label, TagFlag::Protected, false).await
}

/// Create default rows for labels never seen before, logging each one.
pub async fn ensure_tags(ctx: &CoordinationContext, labels: &[TagLabel]) -> ApiResult<()> {
    let created = ctx.store().ensure_tags(labels).await?;
    for label in &created {
        tracing::info!(label = %label, "Created tag on first use");
    }
    Ok(())
}

async fn protected_among(
    ctx: &CoordinationContext,
    labels: &[TagLabel],
) -> ApiResult<BTreeSet<TagLabel>> {
    let tags = ctx.store().tags_by_label(labels).await?;
    Ok(tags
        .into_iter()
        .filter(|tag| tag.protected)
        .map(|tag| tag.label)
        .collect())
}

/// Reject a non-admin tag change that adds or removes a protected label.
///
/// `previous` is empty for a new publication. Protected labels already on
/// the record may stay.
pub async fn check_protected(
    ctx: &CoordinationContext,
    previous: &[TagLabel],
    requested: &[TagLabel],
) -> ApiResult<()> {
    let caller = ctx.caller()?;
    if caller.admin {
        return Ok(());
    }

    let mut touched: Vec<TagLabel> = previous.to_vec();
    touched.extend(requested.iter().cloned());
    let protected = protected_among(ctx, &touched).await?;
    if protected.is_empty() {
        return Ok(());
    }

    let added: Vec<&TagLabel> = requested
        .iter()
        .filter(|label| protected.contains(*label) && !previous.contains(*label))
        .collect();
    let removed: Vec<&TagLabel> = previous
        .iter()
        .filter(|label| protected.contains(*label) && !requested.contains(*label))
        .collect();

    if let Some(label) = added.first() {
        tracing::warn!(user = %caller.username, label = %label, "Rejected protected label");
        return Err(ApiError::Forbidden(format!(
            "tag '{label}' is protected and can only be applied by an admin"
        )));
    }
    if let Some(label) = removed.first() {
        tracing::warn!(user = %caller.username, label = %label, "Rejected protected label removal");
        return Err(ApiError::Forbidden(format!(
            "tag '{label}' is protected and can only be removed by an admin"
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
