//! Background schedule computation.
//!
//! Every schedule tick produces four lists, in order:
//!
//! 1. Users with no permissions, because they can't do anything meaningful
//!    (e.g. not able to search private code).
//! 2. Private repositories with no permissions, because nobody except site
//!    admins can view them.
//! 3. Rolling refresh of user permissions, oldest first.
//! 4. Rolling refresh of repository permissions, oldest first.
//!
//! No-perms entries are eligible immediately; oldest-perms entries are
//! deferred to `updated_at + refresh_interval` so a freshly synced row is
//! not re-fetched until its refresh window has passed.

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::metrics;
use crate::store;

use super::engine::SyncerOptions;
use super::request::Priority;

/// A user picked for background syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScheduledUser {
    pub priority: Priority,
    pub user_id: u32,
    pub next_sync_at: Option<DateTime<Utc>>,
}

/// A repository picked for background syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScheduledRepo {
    pub priority: Priority,
    pub repo_id: u32,
    pub next_sync_at: Option<DateTime<Utc>>,
}

/// One tick's worth of scheduled work.
#[derive(Debug, Clone, Default)]
pub(crate) struct Schedule {
    pub users: Vec<ScheduledUser>,
    pub repos: Vec<ScheduledRepo>,
}

/// Users that have never been synced. Eligible immediately.
async fn schedule_users_with_no_perms(
    db: &DatabaseConnection,
) -> store::Result<Vec<ScheduledUser>> {
    let ids = store::perms::user_ids_with_no_perms(db).await?;
    metrics::set_no_perms("user", ids.len());

    Ok(ids
        .into_iter()
        .map(|user_id| ScheduledUser {
            priority: Priority::Low,
            user_id,
            next_sync_at: None,
        })
        .collect())
}

/// Private repositories that have never been synced. Eligible immediately.
async fn schedule_repos_with_no_perms(
    db: &DatabaseConnection,
) -> store::Result<Vec<ScheduledRepo>> {
    let ids = store::perms::repo_ids_with_no_perms(db).await?;
    metrics::set_no_perms("repo", ids.len());

    Ok(ids
        .into_iter()
        .map(|repo_id| ScheduledRepo {
            priority: Priority::Low,
            repo_id,
            next_sync_at: None,
        })
        .collect())
}

/// Users with the oldest permissions, deferred by the refresh interval.
async fn schedule_users_with_oldest_perms(
    db: &DatabaseConnection,
    options: &SyncerOptions,
) -> store::Result<Vec<ScheduledUser>> {
    let results =
        store::perms::user_ids_with_oldest_perms(db, options.oldest_perms_limit).await?;

    Ok(results
        .into_iter()
        .map(|(user_id, updated_at)| ScheduledUser {
            priority: Priority::Low,
            user_id,
            next_sync_at: Some(updated_at + options.refresh_interval),
        })
        .collect())
}

/// Repositories with the oldest permissions, deferred by the refresh interval.
async fn schedule_repos_with_oldest_perms(
    db: &DatabaseConnection,
    options: &SyncerOptions,
) -> store::Result<Vec<ScheduledRepo>> {
    let results =
        store::perms::repo_ids_with_oldest_perms(db, options.oldest_perms_limit).await?;

    Ok(results
        .into_iter()
        .map(|(repo_id, updated_at)| ScheduledRepo {
            priority: Priority::Low,
            repo_id,
            next_sync_at: Some(updated_at + options.refresh_interval),
        })
        .collect())
}

/// Compute one schedule tick. No-perms entries come first in each list so
/// entities with nothing at all beat rolling refreshes.
pub(crate) async fn compute_schedule(
    db: &DatabaseConnection,
    options: &SyncerOptions,
) -> store::Result<Schedule> {
    let mut schedule = Schedule::default();

    schedule
        .users
        .extend(schedule_users_with_no_perms(db).await?);
    schedule
        .repos
        .extend(schedule_repos_with_no_perms(db).await?);
    schedule
        .users
        .extend(schedule_users_with_oldest_perms(db, options).await?);
    schedule
        .repos
        .extend(schedule_repos_with_oldest_perms(db, options).await?);

    Ok(schedule)
}
