//! PostgreSQL backend.
//!
//! Every multi-statement operation runs in one transaction. Writes keyed on
//! `(owner, path)` serialize on the unique constraint or on a row lock of the
//! share, so concurrent calls for the same key cannot interleave.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nbrepo_core::{
    InviteId, NotebookPath, PublicationId, ShareId, TagId, TagLabel, Username,
};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::models::*;

const PUBLICATION_COLUMNS: &str = "id, owner, api_path, file_path, name, description, author, \
     quality, citation, copied, launched, publication_date, updated";

const SHARE_COLUMNS: &str = "id, owner, notebook_path, created";

const INVITE_COLUMNS: &str = "id, share_id, username, accepted, invited_at, position";

fn labels_to_strings(labels: &[TagLabel]) -> Vec<String> {
    labels.iter().map(|l| l.as_str().to_string()).collect()
}

fn users_to_strings(users: &[Username]) -> Vec<String> {
    users.iter().map(|u| u.as_str().to_string()).collect()
}

// ==================== User Operations ====================

pub(crate) async fn upsert_user(
    pool: &PgPool,
    username: &Username,
    admin: bool,
) -> StoreResult<UserRecord> {
    sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (username, admin)
        VALUES ($1, $2)
        ON CONFLICT (username) DO UPDATE SET admin = EXCLUDED.admin
        RETURNING username, admin, created
        "#,
    )
    .bind(username.as_str())
    .bind(admin)
    .fetch_one(pool)
    .await?
    .into_record()
}

pub(crate) async fn get_user(pool: &PgPool, username: &Username) -> StoreResult<Option<UserRecord>> {
    sqlx::query_as::<_, UserRow>(r#"SELECT username, admin, created FROM users WHERE username = $1"#)
        .bind(username.as_str())
        .fetch_optional(pool)
        .await?
        .map(UserRow::into_record)
        .transpose()
}

pub(crate) async fn unknown_users(pool: &PgPool, users: &[Username]) -> StoreResult<Vec<Username>> {
    let known: Vec<(String,)> =
        sqlx::query_as(r#"SELECT username FROM users WHERE username = ANY($1)"#)
            .bind(users_to_strings(users))
            .fetch_all(pool)
            .await?;

    Ok(users
        .iter()
        .filter(|u| !known.iter().any(|(k,)| k == u.as_str()))
        .cloned()
        .collect())
}

// ==================== Publication Operations ====================

async fn publication_tags(
    conn: &mut sqlx::PgConnection,
    id: i64,
) -> StoreResult<Vec<TagLabel>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT t.label
        FROM publication_tags pt
        JOIN tags t ON t.id = pt.tag_id
        WHERE pt.publication_id = $1
        ORDER BY t.label
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(label,)| TagLabel::parse(&label).map_err(|e| StoreError::corrupt("tags", e)))
        .collect()
}

async fn attach_tags(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    labels: &[TagLabel],
) -> StoreResult<()> {
    // Labels are upserted here as well so a publication can never reference a
    // label without a row.
    sqlx::query(r#"INSERT INTO tags (label) SELECT unnest($1::text[]) ON CONFLICT (label) DO NOTHING"#)
        .bind(labels_to_strings(labels))
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO publication_tags (publication_id, tag_id)
        SELECT $1, id FROM tags WHERE label = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(labels_to_strings(labels))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub(crate) async fn insert_publication(
    pool: &PgPool,
    new: &NewPublication,
    now: DateTime<Utc>,
) -> StoreResult<PublicationRecord> {
    let mut tx = pool.begin().await?;
    let meta = &new.metadata;

    let row = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"
        INSERT INTO publications (
            owner, api_path, file_path, name, description, author,
            quality, citation, publication_date, updated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        ON CONFLICT (owner, api_path) DO NOTHING
        RETURNING {PUBLICATION_COLUMNS}
        "#
    ))
    .bind(new.owner.as_str())
    .bind(new.api_path.as_str())
    .bind(&new.file_path)
    .bind(&meta.name)
    .bind(&meta.description)
    .bind(&meta.author)
    .bind(meta.quality.as_str())
    .bind(&meta.citation)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::DuplicatePublication {
        owner: new.owner.clone(),
        api_path: new.api_path.clone(),
    })?;

    attach_tags(&mut tx, row.id, &meta.tags).await?;
    let tags = publication_tags(&mut tx, row.id).await?;
    tx.commit().await?;

    row.into_record(tags)
}

pub(crate) async fn get_publication(
    pool: &PgPool,
    id: PublicationId,
) -> StoreResult<PublicationRecord> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"SELECT {PUBLICATION_COLUMNS} FROM publications WHERE id = $1"#
    ))
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::PublicationNotFound(id))?;

    let tags = publication_tags(&mut conn, row.id).await?;
    row.into_record(tags)
}

pub(crate) async fn publication_exists(
    pool: &PgPool,
    owner: &Username,
    api_path: &NotebookPath,
) -> StoreResult<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM publications WHERE owner = $1 AND api_path = $2)"#,
    )
    .bind(owner.as_str())
    .bind(api_path.as_str())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub(crate) async fn list_publications(pool: &PgPool) -> StoreResult<Vec<PublicationRecord>> {
    let rows = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"SELECT {PUBLICATION_COLUMNS} FROM publications ORDER BY id"#
    ))
    .fetch_all(pool)
    .await?;

    let pairs: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT pt.publication_id, t.label
        FROM publication_tags pt
        JOIN tags t ON t.id = pt.tag_id
        ORDER BY t.label
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<i64, Vec<TagLabel>> = HashMap::new();
    for (publication_id, label) in pairs {
        let label = TagLabel::parse(&label).map_err(|e| StoreError::corrupt("tags", e))?;
        tags.entry(publication_id).or_default().push(label);
    }

    rows.into_iter()
        .map(|row| {
            let labels = tags.remove(&row.id).unwrap_or_default();
            row.into_record(labels)
        })
        .collect()
}

pub(crate) async fn replace_publication(
    pool: &PgPool,
    id: PublicationId,
    meta: &PublicationMetadata,
    now: DateTime<Utc>,
) -> StoreResult<PublicationRecord> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"
        UPDATE publications
        SET name = $2, description = $3, author = $4, quality = $5, citation = $6, updated = $7
        WHERE id = $1
        RETURNING {PUBLICATION_COLUMNS}
        "#
    ))
    .bind(id.get())
    .bind(&meta.name)
    .bind(&meta.description)
    .bind(&meta.author)
    .bind(meta.quality.as_str())
    .bind(&meta.citation)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::PublicationNotFound(id))?;

    sqlx::query(r#"DELETE FROM publication_tags WHERE publication_id = $1"#)
        .bind(id.get())
        .execute(&mut *tx)
        .await?;
    attach_tags(&mut tx, row.id, &meta.tags).await?;
    let tags = publication_tags(&mut tx, row.id).await?;
    tx.commit().await?;

    row.into_record(tags)
}

pub(crate) async fn delete_publication(
    pool: &PgPool,
    id: PublicationId,
) -> StoreResult<PublicationRecord> {
    let mut tx = pool.begin().await?;
    let tags = publication_tags(&mut tx, id.get()).await?;

    let row = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"DELETE FROM publications WHERE id = $1 RETURNING {PUBLICATION_COLUMNS}"#
    ))
    .bind(id.get())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::PublicationNotFound(id))?;
    tx.commit().await?;

    row.into_record(tags)
}

pub(crate) async fn increment_counter(
    pool: &PgPool,
    id: PublicationId,
    counter: Counter,
) -> StoreResult<PublicationRecord> {
    let column = match counter {
        Counter::Copied => "copied",
        Counter::Launched => "launched",
    };
    let mut conn = pool.acquire().await?;
    let row = sqlx::query_as::<_, PublicationRow>(&format!(
        r#"UPDATE publications SET {column} = {column} + 1 WHERE id = $1 RETURNING {PUBLICATION_COLUMNS}"#
    ))
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::PublicationNotFound(id))?;

    let tags = publication_tags(&mut conn, row.id).await?;
    row.into_record(tags)
}

// ==================== Tag Operations ====================

pub(crate) async fn ensure_tags(pool: &PgPool, labels: &[TagLabel]) -> StoreResult<Vec<TagLabel>> {
    let created: Vec<(String,)> = sqlx::query_as(
        r#"
        INSERT INTO tags (label)
        SELECT unnest($1::text[])
        ON CONFLICT (label) DO NOTHING
        RETURNING label
        "#,
    )
    .bind(labels_to_strings(labels))
    .fetch_all(pool)
    .await?;

    created
        .into_iter()
        .map(|(label,)| TagLabel::parse(&label).map_err(|e| StoreError::corrupt("tags", e)))
        .collect()
}

pub(crate) async fn list_tags(pool: &PgPool) -> StoreResult<Vec<TagRecord>> {
    sqlx::query_as::<_, TagRow>(
        r#"SELECT id, label, description, pinned, protected FROM tags ORDER BY label"#,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TagRow::into_record)
    .collect()
}

pub(crate) async fn tags_by_label(pool: &PgPool, labels: &[TagLabel]) -> StoreResult<Vec<TagRecord>> {
    sqlx::query_as::<_, TagRow>(
        r#"
        SELECT id, label, description, pinned, protected
        FROM tags WHERE label = ANY($1)
        ORDER BY label
        "#,
    )
    .bind(labels_to_strings(labels))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TagRow::into_record)
    .collect()
}

pub(crate) async fn update_tag(
    pool: &PgPool,
    id: TagId,
    changes: &TagChanges,
) -> StoreResult<TagRecord> {
    sqlx::query_as::<_, TagRow>(
        r#"
        UPDATE tags
        SET pinned = COALESCE($2, pinned),
            protected = COALESCE($3, protected),
            description = COALESCE($4, description)
        WHERE id = $1
        RETURNING id, label, description, pinned, protected
        "#,
    )
    .bind(id.get())
    .bind(changes.pinned)
    .bind(changes.protected)
    .bind(&changes.description)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::TagNotFound(id))?
    .into_record()
}

pub(crate) async fn upsert_tag(
    pool: &PgPool,
    label: &TagLabel,
    changes: &TagChanges,
) -> StoreResult<(TagRecord, bool)> {
    let mut tx = pool.begin().await?;

    let created: Option<(i64,)> = sqlx::query_as(
        r#"INSERT INTO tags (label) VALUES ($1) ON CONFLICT (label) DO NOTHING RETURNING id"#,
    )
    .bind(label.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, TagRow>(
        r#"
        UPDATE tags
        SET pinned = COALESCE($2, pinned),
            protected = COALESCE($3, protected),
            description = COALESCE($4, description)
        WHERE label = $1
        RETURNING id, label, description, pinned, protected
        "#,
    )
    .bind(label.as_str())
    .bind(changes.pinned)
    .bind(changes.protected)
    .bind(&changes.description)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok((row.into_record()?, created.is_some()))
}

// ==================== Share Operations ====================

async fn load_invites(
    conn: &mut sqlx::PgConnection,
    share_ids: &[i64],
) -> StoreResult<HashMap<i64, Vec<InviteRow>>> {
    let rows = sqlx::query_as::<_, InviteRow>(&format!(
        r#"SELECT {INVITE_COLUMNS} FROM invites WHERE share_id = ANY($1) ORDER BY share_id, position"#
    ))
    .bind(share_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<i64, Vec<InviteRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.share_id).or_default().push(row);
    }
    Ok(grouped)
}

async fn assemble_shares(
    conn: &mut sqlx::PgConnection,
    rows: Vec<ShareRow>,
) -> StoreResult<Vec<ShareRecord>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut invites = load_invites(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let children = invites.remove(&row.id).unwrap_or_default();
            row.into_record(children)
        })
        .collect()
}

async fn load_share(conn: &mut sqlx::PgConnection, row: ShareRow) -> StoreResult<ShareRecord> {
    let mut shares = assemble_shares(conn, vec![row]).await?;
    shares
        .pop()
        .ok_or_else(|| StoreError::corrupt("shares", "share vanished while loading"))
}

async fn lock_share(
    tx: &mut Transaction<'_, Postgres>,
    id: ShareId,
) -> StoreResult<ShareRow> {
    sqlx::query_as::<_, ShareRow>(&format!(
        r#"SELECT {SHARE_COLUMNS} FROM shares WHERE id = $1 FOR UPDATE"#
    ))
    .bind(id.get())
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::ShareNotFound(id))
}

pub(crate) async fn replace_collaborators(
    pool: &PgPool,
    owner: &Username,
    path: &NotebookPath,
    requested: &[Username],
    now: DateTime<Utc>,
) -> StoreResult<ShareUpdate> {
    let mut tx = pool.begin().await?;

    // The no-op DO UPDATE makes the upsert return (and lock) an existing row.
    let (share_id, created): (i64, bool) = sqlx::query_as(
        r#"
        INSERT INTO shares (owner, notebook_path, created)
        VALUES ($1, $2, $3)
        ON CONFLICT (owner, notebook_path) DO UPDATE SET owner = EXCLUDED.owner
        RETURNING id, (xmax = 0) AS created
        "#,
    )
    .bind(owner.as_str())
    .bind(path.as_str())
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let existing: Vec<(String, i32)> = sqlx::query_as(
        r#"SELECT username, position FROM invites WHERE share_id = $1 ORDER BY position"#,
    )
    .bind(share_id)
    .fetch_all(&mut *tx)
    .await?;
    let existing_users: Vec<Username> = existing
        .iter()
        .map(|(u, _)| Username::parse(u).map_err(|e| StoreError::corrupt("invites", e)))
        .collect::<StoreResult<_>>()?;

    let plan = CollaboratorPlan::diff(&existing_users, requested);

    if !plan.removed.is_empty() {
        sqlx::query(r#"DELETE FROM invites WHERE share_id = $1 AND username = ANY($2)"#)
            .bind(share_id)
            .bind(users_to_strings(&plan.removed))
            .execute(&mut *tx)
            .await?;
    }

    let mut position = existing.iter().map(|(_, p)| *p).max().unwrap_or(0);
    for user in &plan.added {
        position += 1;
        sqlx::query(
            r#"
            INSERT INTO invites (share_id, username, accepted, invited_at, position)
            VALUES ($1, $2, FALSE, $3, $4)
            "#,
        )
        .bind(share_id)
        .bind(user.as_str())
        .bind(now)
        .bind(position)
        .execute(&mut *tx)
        .await?;
    }

    let row = lock_share(&mut tx, ShareId(share_id)).await?;
    let record = load_share(&mut tx, row).await?;
    if record.collaborators.is_empty() {
        // Dropping the transaction rolls back; an empty share is never visible.
        return Err(StoreError::EmptyCollaborators);
    }
    tx.commit().await?;

    Ok(ShareUpdate {
        record,
        created,
        added: plan.added,
        removed: plan.removed,
    })
}

pub(crate) async fn get_share(pool: &PgPool, id: ShareId) -> StoreResult<ShareRecord> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query_as::<_, ShareRow>(&format!(
        r#"SELECT {SHARE_COLUMNS} FROM shares WHERE id = $1"#
    ))
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::ShareNotFound(id))?;

    load_share(&mut conn, row).await
}

pub(crate) async fn find_share(
    pool: &PgPool,
    owner: &Username,
    path: &NotebookPath,
) -> StoreResult<Option<ShareRecord>> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query_as::<_, ShareRow>(&format!(
        r#"SELECT {SHARE_COLUMNS} FROM shares WHERE owner = $1 AND notebook_path = $2"#
    ))
    .bind(owner.as_str())
    .bind(path.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(load_share(&mut conn, row).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn list_shares_for_user(pool: &PgPool, user: &Username) -> StoreResult<UserShares> {
    let mut conn = pool.acquire().await?;

    let by_me = sqlx::query_as::<_, ShareRow>(&format!(
        r#"SELECT {SHARE_COLUMNS} FROM shares WHERE owner = $1 ORDER BY created, id"#
    ))
    .bind(user.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let with_me = sqlx::query_as::<_, ShareRow>(
        r#"
        SELECT s.id, s.owner, s.notebook_path, s.created
        FROM shares s
        JOIN invites i ON i.share_id = s.id
        WHERE i.username = $1
        ORDER BY s.created, s.id
        "#,
    )
    .bind(user.as_str())
    .fetch_all(&mut *conn)
    .await?;

    Ok(UserShares {
        shared_by_me: assemble_shares(&mut conn, by_me).await?,
        shared_with_me: assemble_shares(&mut conn, with_me).await?,
    })
}

pub(crate) async fn share_for_invite(pool: &PgPool, invite: InviteId) -> StoreResult<ShareRecord> {
    let share_id: (i64,) = sqlx::query_as(r#"SELECT share_id FROM invites WHERE id = $1"#)
        .bind(invite.get())
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::InviteNotFound(invite))?;

    get_share(pool, ShareId(share_id.0)).await
}

pub(crate) async fn accept_invite(pool: &PgPool, invite: InviteId) -> StoreResult<ShareRecord> {
    let share_id: (i64,) =
        sqlx::query_as(r#"UPDATE invites SET accepted = TRUE WHERE id = $1 RETURNING share_id"#)
            .bind(invite.get())
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::InviteNotFound(invite))?;

    get_share(pool, ShareId(share_id.0)).await
}

pub(crate) async fn remove_invite(pool: &PgPool, invite: InviteId) -> StoreResult<DeclineOutcome> {
    let mut tx = pool.begin().await?;

    let share_id: (i64,) = sqlx::query_as(r#"SELECT share_id FROM invites WHERE id = $1"#)
        .bind(invite.get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::InviteNotFound(invite))?;

    let row = lock_share(&mut tx, ShareId(share_id.0)).await?;
    let before = load_share(&mut tx, row.clone()).await?;

    let deleted = sqlx::query(r#"DELETE FROM invites WHERE id = $1"#)
        .bind(invite.get())
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(StoreError::InviteNotFound(invite));
    }

    let outcome = if before.collaborators.len() <= 1 {
        sqlx::query(r#"DELETE FROM shares WHERE id = $1"#)
            .bind(share_id.0)
            .execute(&mut *tx)
            .await?;
        DeclineOutcome::ShareDeleted(before)
    } else {
        DeclineOutcome::InviteRemoved(load_share(&mut tx, row).await?)
    };
    tx.commit().await?;

    Ok(outcome)
}

pub(crate) async fn delete_share(pool: &PgPool, id: ShareId) -> StoreResult<ShareRecord> {
    let mut tx = pool.begin().await?;
    let row = lock_share(&mut tx, id).await?;
    let record = load_share(&mut tx, row).await?;

    sqlx::query(r#"DELETE FROM shares WHERE id = $1"#)
        .bind(id.get())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(record)
}
