//! Permissions store operations.
//!
//! This module persists the authoritative user→repos and repo→users read
//! mappings, plus pending permissions for code-host accounts that are not
//! yet bound to an internal user. Permission ID sets are roaring bitmaps
//! serialized into BLOB columns.
//!
//! All functions are generic over [`ConnectionTrait`] so the same operations
//! run against a plain connection or inside a transaction. The combined
//! repo + pending write uses sea-orm's scoped transaction API, which commits
//! on `Ok` and rolls back on every other exit path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use sea_orm::sea_query::{Condition, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionError,
    TransactionTrait,
};

use sea_orm::entity::prelude::DateTimeWithTimeZone;

use crate::entity::perm_level::PermLevel;
use crate::entity::{
    external_account, pending_permissions, repo, repo_permissions, user, user_permissions,
};
use crate::fetcher::ExternalAccounts;

use super::errors::{Result, StoreError, is_retryable_error};

/// Default number of retry attempts for permission write operations.
pub const DEFAULT_WRITE_RETRIES: u32 = 3;

/// Default initial backoff delay in milliseconds for write retries.
pub const DEFAULT_WRITE_BACKOFF_MS: u64 = 100;

/// The set of private repositories a user can read.
#[derive(Debug, Clone)]
pub struct UserPermissions {
    /// Internal user ID.
    pub user_id: u32,
    /// Permission level granted over the object IDs.
    pub perm: PermLevel,
    /// Internal repo IDs the user has access to.
    pub object_ids: RoaringBitmap,
    /// When the row was last written; `None` until loaded or persisted.
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPermissions {
    /// Create an empty permission set for a user.
    pub fn new(user_id: u32, perm: PermLevel) -> Self {
        Self {
            user_id,
            perm,
            object_ids: RoaringBitmap::new(),
            updated_at: None,
        }
    }
}

/// The set of users that can read a repository.
#[derive(Debug, Clone)]
pub struct RepoPermissions {
    /// Internal repo ID.
    pub repo_id: u32,
    /// Permission level granted to the user IDs.
    pub perm: PermLevel,
    /// Internal user IDs with access to the repo.
    pub user_ids: RoaringBitmap,
    /// When the row was last written; `None` until loaded or persisted.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RepoPermissions {
    /// Create an empty permission set for a repository.
    pub fn new(repo_id: u32, perm: PermLevel) -> Self {
        Self {
            repo_id,
            perm,
            user_ids: RoaringBitmap::new(),
            updated_at: None,
        }
    }
}

/// Aggregate staleness numbers for the metrics loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermsMetrics {
    /// Users whose permissions are older than the cutoff.
    pub users_with_stale_perms: u64,
    /// Seconds between the least and most recently updated user rows.
    pub users_perms_gap_seconds: f64,
    /// Private repos whose permissions are older than the cutoff.
    pub repos_with_stale_perms: u64,
    /// Seconds between the least and most recently updated repo rows.
    pub repos_perms_gap_seconds: f64,
}

/// Serialize a roaring bitmap for storage in a BLOB column.
fn encode_bitmap(bitmap: &RoaringBitmap) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(bitmap.serialized_size());
    bitmap
        .serialize_into(&mut buf)
        .map_err(|e| StoreError::invalid_input(format!("serialize bitmap: {e}")))?;
    Ok(buf)
}

/// Deserialize a roaring bitmap from a BLOB column.
fn decode_bitmap(bytes: &[u8], context: &str) -> Result<RoaringBitmap> {
    RoaringBitmap::deserialize_from(bytes)
        .map_err(|e| StoreError::corrupt_bitmap(format!("{context}: {e}")))
}

fn to_utc(ts: DateTimeWithTimeZone) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

// ─── User Permissions ────────────────────────────────────────────────────────

/// Load the permission set for a user, or `None` if the user has never been
/// synced.
pub async fn load_user_permissions<C: ConnectionTrait>(
    conn: &C,
    user_id: u32,
    perm: PermLevel,
) -> Result<Option<UserPermissions>> {
    let row = user_permissions::Entity::find_by_id((i64::from(user_id), perm))
        .one(conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(UserPermissions {
        user_id,
        perm,
        object_ids: decode_bitmap(&row.object_ids, &format!("user_permissions user={user_id}"))?,
        updated_at: Some(to_utc(row.updated_at)),
    }))
}

/// Overwrite the permission set for a user, stamping `updated_at = now`.
pub async fn set_user_permissions<C: ConnectionTrait>(
    conn: &C,
    perms: &UserPermissions,
    now: DateTime<Utc>,
) -> Result<()> {
    let model = user_permissions::ActiveModel {
        user_id: Set(i64::from(perms.user_id)),
        permission: Set(perms.perm),
        object_ids: Set(encode_bitmap(&perms.object_ids)?),
        updated_at: Set(now.fixed_offset()),
    };

    user_permissions::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                user_permissions::Column::UserId,
                user_permissions::Column::Permission,
            ])
            .update_columns([
                user_permissions::Column::ObjectIds,
                user_permissions::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec(conn)
        .await?;

    Ok(())
}

/// Overwrite the permission set for a repository, stamping `updated_at = now`.
pub async fn set_repo_permissions<C: ConnectionTrait>(
    conn: &C,
    perms: &RepoPermissions,
    now: DateTime<Utc>,
) -> Result<()> {
    let model = repo_permissions::ActiveModel {
        repo_id: Set(i64::from(perms.repo_id)),
        permission: Set(perms.perm),
        user_ids: Set(encode_bitmap(&perms.user_ids)?),
        updated_at: Set(now.fixed_offset()),
    };

    repo_permissions::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                repo_permissions::Column::RepoId,
                repo_permissions::Column::Permission,
            ])
            .update_columns([
                repo_permissions::Column::UserIds,
                repo_permissions::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec(conn)
        .await?;

    Ok(())
}

/// Reconcile pending permissions for a repository.
///
/// After this call, exactly the listed account IDs (for the given service)
/// carry `perms.repo_id` in their pending rows: listed accounts gain the
/// repo, previously-pending accounts that are no longer listed lose it, and
/// rows whose bitmap empties out are deleted.
pub async fn set_repo_pending_permissions<C: ConnectionTrait>(
    conn: &C,
    accounts: &ExternalAccounts,
    perms: &RepoPermissions,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = pending_permissions::Entity::find()
        .filter(pending_permissions::Column::ServiceType.eq(&accounts.service_type))
        .filter(pending_permissions::Column::ServiceId.eq(&accounts.service_id))
        .filter(pending_permissions::Column::Permission.eq(perms.perm))
        .all(conn)
        .await?;

    let mut existing: HashMap<String, pending_permissions::Model> = rows
        .into_iter()
        .map(|row| (row.account_id.clone(), row))
        .collect();

    for account_id in &accounts.account_ids {
        match existing.remove(account_id) {
            Some(row) => {
                let context = format!("pending_permissions account={account_id}");
                let mut bitmap = decode_bitmap(&row.object_ids, &context)?;
                if bitmap.insert(perms.repo_id) {
                    let mut model: pending_permissions::ActiveModel = row.into();
                    model.object_ids = Set(encode_bitmap(&bitmap)?);
                    model.updated_at = Set(now.fixed_offset());
                    model.update(conn).await?;
                }
            }
            None => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert(perms.repo_id);
                let model = pending_permissions::ActiveModel {
                    service_type: Set(accounts.service_type.clone()),
                    service_id: Set(accounts.service_id.clone()),
                    account_id: Set(account_id.clone()),
                    permission: Set(perms.perm),
                    object_ids: Set(encode_bitmap(&bitmap)?),
                    updated_at: Set(now.fixed_offset()),
                    ..Default::default()
                };
                model.insert(conn).await?;
            }
        }
    }

    // Whatever remains was pending for this service but is no longer listed.
    for (account_id, row) in existing {
        let context = format!("pending_permissions account={account_id}");
        let mut bitmap = decode_bitmap(&row.object_ids, &context)?;
        if !bitmap.remove(perms.repo_id) {
            continue;
        }
        if bitmap.is_empty() {
            pending_permissions::Entity::delete_by_id(row.id)
                .exec(conn)
                .await?;
        } else {
            let mut model: pending_permissions::ActiveModel = row.into();
            model.object_ids = Set(encode_bitmap(&bitmap)?);
            model.updated_at = Set(now.fixed_offset());
            model.update(conn).await?;
        }
    }

    Ok(())
}

/// Write repository permissions and the matching pending rows in a single
/// transaction. Either both land or neither does.
pub async fn set_repo_and_pending_permissions(
    db: &DatabaseConnection,
    perms: &RepoPermissions,
    accounts: &ExternalAccounts,
    now: DateTime<Utc>,
) -> Result<()> {
    let perms = perms.clone();
    let accounts = accounts.clone();

    db.transaction::<_, (), StoreError>(move |txn| {
        Box::pin(async move {
            set_repo_permissions(txn, &perms, now).await?;
            set_repo_pending_permissions(txn, &accounts, &perms, now).await?;
            Ok(())
        })
    })
    .await
    .map_err(|e| match e {
        TransactionError::Connection(db_err) => StoreError::Database(db_err),
        TransactionError::Transaction(err) => err,
    })
}

/// Merge the pending permissions of a code-host account into a user's
/// permission set and delete the pending row.
///
/// Called when an external account gets bound to an internal user. A no-op
/// when nothing is pending for the account.
pub async fn grant_pending_permissions(
    db: &DatabaseConnection,
    user_id: u32,
    service_type: &str,
    service_id: &str,
    account_id: &str,
    perm: PermLevel,
    now: DateTime<Utc>,
) -> Result<()> {
    let service_type = service_type.to_string();
    let service_id = service_id.to_string();
    let account_id = account_id.to_string();

    db.transaction::<_, (), StoreError>(move |txn| {
        Box::pin(async move {
            let row = pending_permissions::Entity::find()
                .filter(pending_permissions::Column::ServiceType.eq(&service_type))
                .filter(pending_permissions::Column::ServiceId.eq(&service_id))
                .filter(pending_permissions::Column::AccountId.eq(&account_id))
                .filter(pending_permissions::Column::Permission.eq(perm))
                .one(txn)
                .await?;

            let Some(row) = row else {
                return Ok(());
            };

            let context = format!("pending_permissions account={account_id}");
            let pending = decode_bitmap(&row.object_ids, &context)?;

            let mut perms = load_user_permissions(txn, user_id, perm)
                .await?
                .unwrap_or_else(|| UserPermissions::new(user_id, perm));
            perms.object_ids |= pending;

            set_user_permissions(txn, &perms, now).await?;
            pending_permissions::Entity::delete_by_id(row.id)
                .exec(txn)
                .await?;
            Ok(())
        })
    })
    .await
    .map_err(|e| match e {
        TransactionError::Connection(db_err) => StoreError::Database(db_err),
        TransactionError::Transaction(err) => err,
    })
}

// ─── Retry Wrappers ──────────────────────────────────────────────────────────

async fn with_write_retry<T, F, Fut>(
    mut op: F,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff_ms = initial_backoff_ms;
    let mut last_error: Option<StoreError> = None;

    for attempt in 0..=max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if is_retryable_error(&e) && attempt < max_retries {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms,
                        error = %e,
                        "Permission write failed, retrying..."
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| StoreError::invalid_input("unexpected retry loop exit".to_string())))
}

/// [`set_user_permissions`] with bounded retry on transient database errors.
pub async fn set_user_permissions_with_retry(
    db: &DatabaseConnection,
    perms: &UserPermissions,
    now: DateTime<Utc>,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<()> {
    with_write_retry(
        || set_user_permissions(db, perms, now),
        max_retries,
        initial_backoff_ms,
    )
    .await
}

/// [`set_repo_and_pending_permissions`] with bounded retry on transient
/// database errors. The whole transaction is retried, never half of it.
pub async fn set_repo_and_pending_permissions_with_retry(
    db: &DatabaseConnection,
    perms: &RepoPermissions,
    accounts: &ExternalAccounts,
    now: DateTime<Utc>,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<()> {
    with_write_retry(
        || set_repo_and_pending_permissions(db, perms, accounts, now),
        max_retries,
        initial_backoff_ms,
    )
    .await
}

// ─── External Accounts ───────────────────────────────────────────────────────

/// List the external accounts bound to a user, oldest binding first.
pub async fn list_external_accounts<C: ConnectionTrait>(
    conn: &C,
    user_id: u32,
) -> Result<Vec<external_account::Model>> {
    external_account::Entity::find()
        .filter(external_account::Column::UserId.eq(i64::from(user_id)))
        .order_by_asc(external_account::Column::Id)
        .all(conn)
        .await
        .map_err(StoreError::from)
}

/// Resolve code-host account IDs to internal user IDs.
///
/// Returns a map from account ID to user ID containing only the accounts
/// that are bound; unbound accounts are simply absent.
pub async fn get_user_ids_by_external_accounts<C: ConnectionTrait>(
    conn: &C,
    accounts: &ExternalAccounts,
) -> Result<HashMap<String, u32>> {
    if accounts.account_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = external_account::Entity::find()
        .filter(external_account::Column::ServiceType.eq(&accounts.service_type))
        .filter(external_account::Column::ServiceId.eq(&accounts.service_id))
        .filter(external_account::Column::AccountId.is_in(accounts.account_ids.iter().cloned()))
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            u32::try_from(row.user_id)
                .ok()
                .map(|user_id| (row.account_id, user_id))
        })
        .collect())
}

// ─── Staleness Queries ───────────────────────────────────────────────────────

/// IDs of users that have no permissions row at all.
pub async fn user_ids_with_no_perms<C: ConnectionTrait>(conn: &C) -> Result<Vec<u32>> {
    let synced = Query::select()
        .column(user_permissions::Column::UserId)
        .from(user_permissions::Entity)
        .to_owned();

    let rows = user::Entity::find()
        .filter(
            Condition::all()
                .add(user::Column::Id.in_subquery(synced))
                .not(),
        )
        .order_by_asc(user::Column::Id)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| u32::try_from(row.id).ok())
        .collect())
}

/// IDs of private repositories that have no permissions row at all.
pub async fn repo_ids_with_no_perms<C: ConnectionTrait>(conn: &C) -> Result<Vec<u32>> {
    let synced = Query::select()
        .column(repo_permissions::Column::RepoId)
        .from(repo_permissions::Entity)
        .to_owned();

    let rows = repo::Entity::find()
        .filter(repo::Column::Private.eq(true))
        .filter(
            Condition::all()
                .add(repo::Column::Id.in_subquery(synced))
                .not(),
        )
        .order_by_asc(repo::Column::Id)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| u32::try_from(row.id).ok())
        .collect())
}

/// Users with the oldest permissions, capped at `limit`, as an
/// id → `updated_at` map.
pub async fn user_ids_with_oldest_perms<C: ConnectionTrait>(
    conn: &C,
    limit: u64,
) -> Result<HashMap<u32, DateTime<Utc>>> {
    let rows = user_permissions::Entity::find()
        .order_by_asc(user_permissions::Column::UpdatedAt)
        .limit(limit)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            u32::try_from(row.user_id)
                .ok()
                .map(|id| (id, to_utc(row.updated_at)))
        })
        .collect())
}

/// Repositories with the oldest permissions, capped at `limit`, as an
/// id → `updated_at` map.
pub async fn repo_ids_with_oldest_perms<C: ConnectionTrait>(
    conn: &C,
    limit: u64,
) -> Result<HashMap<u32, DateTime<Utc>>> {
    let rows = repo_permissions::Entity::find()
        .order_by_asc(repo_permissions::Column::UpdatedAt)
        .limit(limit)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            u32::try_from(row.repo_id)
                .ok()
                .map(|id| (id, to_utc(row.updated_at)))
        })
        .collect())
}

/// Compute staleness metrics over both permission tables.
///
/// A row is stale when its `updated_at` is older than `now - stale_cutoff`.
/// The gap is the distance between the least and most recently updated rows
/// of a kind; zero when the table has fewer than two rows.
pub async fn permissions_metrics<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
    stale_cutoff: chrono::Duration,
) -> Result<PermsMetrics> {
    let cutoff = (now - stale_cutoff).fixed_offset();

    let users_with_stale_perms = user_permissions::Entity::find()
        .filter(user_permissions::Column::UpdatedAt.lt(cutoff))
        .count(conn)
        .await?;

    let repos_with_stale_perms = repo_permissions::Entity::find()
        .filter(repo_permissions::Column::UpdatedAt.lt(cutoff))
        .count(conn)
        .await?;

    let user_range: Option<(Option<DateTimeWithTimeZone>, Option<DateTimeWithTimeZone>)> =
        user_permissions::Entity::find()
            .select_only()
            .column_as(user_permissions::Column::UpdatedAt.min(), "oldest")
            .column_as(user_permissions::Column::UpdatedAt.max(), "newest")
            .into_tuple()
            .one(conn)
            .await?;

    let repo_range: Option<(Option<DateTimeWithTimeZone>, Option<DateTimeWithTimeZone>)> =
        repo_permissions::Entity::find()
            .select_only()
            .column_as(repo_permissions::Column::UpdatedAt.min(), "oldest")
            .column_as(repo_permissions::Column::UpdatedAt.max(), "newest")
            .into_tuple()
            .one(conn)
            .await?;

    Ok(PermsMetrics {
        users_with_stale_perms,
        users_perms_gap_seconds: gap_seconds(user_range),
        repos_with_stale_perms,
        repos_perms_gap_seconds: gap_seconds(repo_range),
    })
}

fn gap_seconds(
    range: Option<(Option<DateTimeWithTimeZone>, Option<DateTimeWithTimeZone>)>,
) -> f64 {
    match range {
        Some((Some(oldest), Some(newest))) => {
            let gap = (newest.with_timezone(&Utc) - oldest.with_timezone(&Utc)).num_milliseconds();
            (gap.max(0) as f64) / 1000.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_roundtrips_through_blob_encoding() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(1);
        bitmap.insert(101);
        bitmap.insert(u32::MAX);

        let bytes = encode_bitmap(&bitmap).expect("encode");
        let decoded = decode_bitmap(&bytes, "test").expect("decode");
        assert_eq!(bitmap, decoded);
    }

    #[test]
    fn empty_bitmap_roundtrips() {
        let bitmap = RoaringBitmap::new();
        let bytes = encode_bitmap(&bitmap).expect("encode");
        let decoded = decode_bitmap(&bytes, "test").expect("decode");
        assert!(decoded.is_empty());
    }

    #[test]
    fn corrupt_bitmap_is_reported_with_context() {
        let err = decode_bitmap(&[0xde, 0xad], "user_permissions user=7")
            .expect_err("garbage bytes should not decode");
        let msg = err.to_string();
        assert!(msg.contains("Corrupt permission bitmap"));
        assert!(msg.contains("user=7"));
    }

    #[test]
    fn new_permission_sets_start_empty() {
        let user = UserPermissions::new(1, PermLevel::Read);
        assert!(user.object_ids.is_empty());
        assert!(user.updated_at.is_none());

        let repo = RepoPermissions::new(2, PermLevel::Read);
        assert!(repo.user_ids.is_empty());
        assert_eq!(repo.perm, PermLevel::Read);
    }

    #[test]
    fn gap_seconds_handles_missing_rows() {
        assert_eq!(gap_seconds(None), 0.0);
        assert_eq!(gap_seconds(Some((None, None))), 0.0);

        let oldest = Utc::now().fixed_offset();
        let newest = (Utc::now() + chrono::Duration::seconds(90)).fixed_offset();
        let gap = gap_seconds(Some((Some(oldest), Some(newest))));
        assert!((gap - 90.0).abs() < 1.0, "gap was {gap}");
    }
}
