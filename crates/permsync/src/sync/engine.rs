//! The permissions sync engine.
//!
//! [`PermsSyncer`] keeps read permissions for users and repositories
//! up-to-date against external code hosts. Foreground callers and the
//! background scheduler enqueue requests; a single consumer loop pops them,
//! reconciles code-host identities with internal IDs, and writes the
//! permissions store. Three long-running loops (sync, schedule, metrics)
//! share one cancellation token and coordinate only through the queue.
//!
//! Failures never kill a loop: each sync's error is logged, counted, and the
//! queue entry removed; the next schedule tick provides the retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::entity::perm_level::PermLevel;
use crate::fetcher::{ExternalAccounts, ExternalRepoSpec, FetcherError, FetcherRegistry};
use crate::metrics;
use crate::store::{self, ListReposArgs, StoreError};

use super::queue::RequestQueue;
use super::request::{Priority, RequestKind, RequestMeta};
use super::scheduler::{self, ScheduledRepo, ScheduledUser};

/// A function returning the current instant. Injected so tests control time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors from a single permissions sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A permissions-store or repo-store operation failed.
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    /// A code-host fetch failed (possibly after yielding partial data).
    #[error("{context}: {source}")]
    Fetch {
        context: &'static str,
        #[source]
        source: FetcherError,
    },
}

impl SyncError {
    fn store(context: &'static str, source: StoreError) -> Self {
        Self::Store { context, source }
    }

    fn fetch(context: &'static str, source: FetcherError) -> Self {
        Self::Fetch { context, source }
    }
}

/// Configuration for the syncer's loops.
#[derive(Debug, Clone)]
pub struct SyncerOptions {
    /// How often the scheduler computes new background work.
    pub schedule_interval: Duration,
    /// Cap on the oldest-perms lists per schedule tick.
    pub oldest_perms_limit: u64,
    /// How long a synced row stays fresh before the scheduler re-queues it.
    pub refresh_interval: chrono::Duration,
    /// Rows older than this count as stale in the metrics.
    pub stale_cutoff: chrono::Duration,
    /// How often the metrics loop samples the store and queue.
    pub metrics_interval: Duration,
    /// Retry attempts for permission writes on transient database errors.
    pub write_retries: u32,
    /// Initial backoff for permission write retries.
    pub write_backoff_ms: u64,
}

impl Default for SyncerOptions {
    fn default() -> Self {
        Self {
            schedule_interval: Duration::from_secs(60),
            oldest_perms_limit: 10,
            refresh_interval: chrono::Duration::hours(1),
            stale_cutoff: chrono::Duration::hours(72),
            metrics_interval: Duration::from_secs(60),
            write_retries: store::DEFAULT_WRITE_RETRIES,
            write_backoff_ms: store::DEFAULT_WRITE_BACKOFF_MS,
        }
    }
}

/// Debug snapshot of the syncer's queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDump {
    /// Subsystem name, for operator endpoints that aggregate dumps.
    pub name: &'static str,
    /// Number of queued entries, acquired ones included.
    pub size: usize,
    /// Entries in scheduling order.
    pub queue: Vec<QueueEntryDump>,
}

/// One queue entry in a [`QueueDump`].
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntryDump {
    pub kind: RequestKind,
    pub id: u32,
    pub priority: Priority,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub acquired: bool,
}

/// The permissions syncing manager.
///
/// Meant to run in the background: construct it, hand foreground components
/// the syncer (or just its schedule methods), and drive [`run`](Self::run)
/// until shutdown.
pub struct PermsSyncer {
    /// The priority queue of pending sync requests.
    queue: Arc<RequestQueue>,
    /// Store handle for permissions and repo lookups.
    db: DatabaseConnection,
    /// Registry of per-code-host permissions fetchers.
    fetchers: Arc<FetcherRegistry>,
    /// Current-time source; injected so tests control eligibility windows.
    clock: Clock,
    options: SyncerOptions,
    /// Global toggle read on each schedule tick.
    enabled: Arc<AtomicBool>,
}

impl PermsSyncer {
    /// Create a syncer with default options and the wall clock.
    pub fn new(db: DatabaseConnection, fetchers: Arc<FetcherRegistry>) -> Self {
        Self {
            queue: Arc::new(RequestQueue::new()),
            db,
            fetchers,
            clock: Arc::new(Utc::now),
            options: SyncerOptions::default(),
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: SyncerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Enable or disable background scheduling. Foreground schedule calls
    /// are unaffected.
    pub fn set_background_sync_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether background scheduling is currently enabled.
    pub fn background_sync_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Schedule permissions syncs for the given users at the given priority.
    ///
    /// Fire-and-forget: requests are eligible immediately and de-duplicated
    /// against whatever is already queued.
    pub fn schedule_users(&self, priority: Priority, user_ids: &[u32]) {
        for &user_id in user_ids {
            let updated = self
                .queue
                .enqueue(RequestMeta::immediate(RequestKind::User, user_id, priority));
            tracing::debug!(user_id, updated, "enqueued user sync request");
        }
    }

    /// Schedule permissions syncs for the given repositories at the given
    /// priority.
    pub fn schedule_repos(&self, priority: Priority, repo_ids: &[u32]) {
        for &repo_id in repo_ids {
            let updated = self
                .queue
                .enqueue(RequestMeta::immediate(RequestKind::Repo, repo_id, priority));
            tracing::debug!(repo_id, updated, "enqueued repo sync request");
        }
    }

    fn schedule_scheduled_users(&self, users: Vec<ScheduledUser>) {
        for user in users {
            let updated = self.queue.enqueue(RequestMeta {
                kind: RequestKind::User,
                id: user.user_id,
                priority: user.priority,
                next_sync_at: user.next_sync_at,
            });
            tracing::debug!(user_id = user.user_id, updated, "enqueued user sync request");
        }
    }

    fn schedule_scheduled_repos(&self, repos: Vec<ScheduledRepo>) {
        for repo in repos {
            let updated = self.queue.enqueue(RequestMeta {
                kind: RequestKind::Repo,
                id: repo.repo_id,
                priority: repo.priority,
                next_sync_at: repo.next_sync_at,
            });
            tracing::debug!(repo_id = repo.repo_id, updated, "enqueued repo sync request");
        }
    }

    /// Process permissions syncing in the user-centric way: every external
    /// account of the user is asked for its readable private repos, the
    /// code-host IDs are resolved to internal private repos, and the user's
    /// permission set is overwritten.
    ///
    /// A fetch that fails partway still contributes its partial data; the
    /// first fetch error is returned after the write so it reaches logs and
    /// counters without discarding anything. A fetch that fails without
    /// yielding any IDs writes nothing: the stored row outlives the outage.
    #[tracing::instrument(skip(self))]
    async fn sync_user_perms(&self, user_id: u32) -> Result<(), SyncError> {
        let accounts = store::perms::list_external_accounts(&self.db, user_id)
            .await
            .map_err(|e| SyncError::store("list external accounts", e))?;

        let fetchers = self.fetchers.snapshot();
        let mut repo_specs: Vec<ExternalRepoSpec> = Vec::new();
        let mut first_fetch_error: Option<FetcherError> = None;

        for account in &accounts {
            let Some(fetcher) = fetchers.get(&account.service_id) else {
                // No authz provider configured for this external account.
                continue;
            };

            let result = fetcher.fetch_user_perms(account).await;
            for id in result.ids {
                repo_specs.push(ExternalRepoSpec {
                    id,
                    service_type: fetcher.service_type().to_string(),
                    service_id: fetcher.service_id().to_string(),
                });
            }
            if let Some(error) = result.error {
                tracing::warn!(
                    user_id,
                    account_id = %account.account_id,
                    error = %error,
                    "user permissions fetch returned an error; keeping partial results"
                );
                first_fetch_error.get_or_insert(error);
            }
        }

        // A fetch that failed outright gathered nothing to write: leave the
        // stored permissions untouched and surface the error; the next
        // schedule tick retries. Partial results below still persist.
        if repo_specs.is_empty() {
            if let Some(error) = first_fetch_error.take() {
                return Err(SyncError::fetch("fetch user permissions", error));
            }
        }

        // Resolve code-host identities to internal IDs, private repos only.
        let repos = if repo_specs.is_empty() {
            Vec::new()
        } else {
            store::repos::list_repos(&self.db, &ListReposArgs::by_external_repos(repo_specs, true))
                .await
                .map_err(|e| SyncError::store("list external repositories", e))?
        };

        let mut perms = store::UserPermissions::new(user_id, PermLevel::Read);
        for repo in &repos {
            if let Ok(id) = u32::try_from(repo.id) {
                perms.object_ids.insert(id);
            }
        }

        store::perms::set_user_permissions_with_retry(
            &self.db,
            &perms,
            (self.clock)(),
            self.options.write_retries,
            self.options.write_backoff_ms,
        )
        .await
        .map_err(|e| SyncError::store("set user permissions", e))?;

        tracing::info!(user_id, repos = perms.object_ids.len(), "synced user permissions");

        match first_fetch_error {
            Some(error) => Err(SyncError::fetch("fetch user permissions", error)),
            None => Ok(()),
        }
    }

    /// Process permissions syncing in the repository-centric way. Requests
    /// for non-existent or public repositories are discarded, as are repos
    /// whose code host has no registered fetcher.
    ///
    /// Account IDs the code host returns are partitioned into bound (known
    /// internal user) and pending; both writes commit in one transaction.
    /// A fetch that fails without yielding any IDs writes nothing, so the
    /// repo's ACL and pending rows survive the outage.
    #[tracing::instrument(skip(self))]
    async fn sync_repo_perms(&self, repo_id: u32) -> Result<(), SyncError> {
        let rows = store::repos::list_repos(&self.db, &ListReposArgs::by_ids([repo_id]))
            .await
            .map_err(|e| SyncError::store("list repositories", e))?;

        let Some(repo) = rows.into_iter().next() else {
            return Ok(());
        };
        if !repo.private {
            return Ok(());
        }

        let Some(fetcher) = self.fetchers.by_service_id(&repo.service_id) else {
            // No authz provider configured for this repository.
            return Ok(());
        };

        let spec = ExternalRepoSpec {
            id: repo.external_id.clone(),
            service_type: repo.service_type.clone(),
            service_id: repo.service_id.clone(),
        };

        let result = fetcher.fetch_repo_perms(&spec).await;
        let account_ids = result.ids;
        let mut fetch_error = result.error;
        if let Some(error) = &fetch_error {
            tracing::warn!(
                repo_id,
                error = %error,
                "repo permissions fetch returned an error; keeping partial results"
            );
        }

        // A total fetch failure must not wipe the repo's ACL or its pending
        // rows: skip the transaction, surface the error, and let the next
        // schedule tick retry. An empty result without an error is a real
        // answer and still overwrites below.
        if account_ids.is_empty() {
            if let Some(error) = fetch_error.take() {
                return Err(SyncError::fetch("fetch repository permissions", error));
            }
        }

        // Partition into bound internal users and pending accounts.
        let bound = store::perms::get_user_ids_by_external_accounts(
            &self.db,
            &ExternalAccounts {
                service_type: fetcher.service_type().to_string(),
                service_id: fetcher.service_id().to_string(),
                account_ids: account_ids.clone(),
            },
        )
        .await
        .map_err(|e| SyncError::store("get user IDs by external accounts", e))?;

        let mut perms = store::RepoPermissions::new(repo_id, PermLevel::Read);
        let mut user_ids = RoaringBitmap::new();
        for user_id in bound.values() {
            user_ids.insert(*user_id);
        }
        perms.user_ids = user_ids;

        let pending = ExternalAccounts {
            service_type: fetcher.service_type().to_string(),
            service_id: fetcher.service_id().to_string(),
            account_ids: account_ids
                .into_iter()
                .filter(|account_id| !bound.contains_key(account_id))
                .collect(),
        };

        store::perms::set_repo_and_pending_permissions_with_retry(
            &self.db,
            &perms,
            &pending,
            (self.clock)(),
            self.options.write_retries,
            self.options.write_backoff_ms,
        )
        .await
        .map_err(|e| SyncError::store("set repository permissions", e))?;

        tracing::info!(
            repo_id,
            name = %repo.name,
            users = perms.user_ids.len(),
            pending = pending.account_ids.len(),
            "synced repo permissions"
        );

        match fetch_error {
            Some(error) => Err(SyncError::fetch("fetch repository permissions", error)),
            None => Ok(()),
        }
    }

    /// Run one sync and remove the request from the queue once it is done,
    /// independent of success or failure.
    async fn sync_perms(&self, request: &RequestMeta) {
        let began = Instant::now();

        let result = match request.kind {
            RequestKind::User => self.sync_user_perms(request.id).await,
            RequestKind::Repo => self.sync_repo_perms(request.id).await,
        };

        self.queue.remove(request.kind, request.id, true);

        let success = result.is_ok();
        metrics::observe_sync_duration(request.kind.as_str(), success, began.elapsed());

        if let Err(error) = result {
            metrics::inc_sync_errors(request.kind.as_str());
            tracing::warn!(
                kind = request.kind.as_str(),
                id = request.id,
                error = %error,
                "failed to sync permissions"
            );
        }
    }

    /// The single consumer loop.
    async fn run_sync(&self, cancel: CancellationToken) {
        tracing::debug!("sync loop started");

        // Re-arms the select when a request was dequeued, so the loop drains
        // the queue without waiting for another enqueue.
        let notify_dequeued = Notify::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.queue.notified() => {}
                _ = notify_dequeued.notified() => {}
            }

            let Some(request) = self.queue.acquire_next() else {
                // No eligible request in the queue.
                continue;
            };

            // Not yet eligible: put it back and wake up when its window opens.
            let now = (self.clock)();
            if let Some(next_sync_at) = request.next_sync_at {
                if next_sync_at > now {
                    self.queue.release(request.kind, request.id);
                    let wait = (next_sync_at - now).to_std().unwrap_or(Duration::ZERO);
                    let queue = Arc::clone(&self.queue);
                    tokio::spawn(async move {
                        tokio::time::sleep(wait).await;
                        queue.notify_enqueue();
                    });
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for next sync window");
                    continue;
                }
            }

            notify_dequeued.notify_one();

            tokio::select! {
                _ = cancel.cancelled() => {
                    // Abandon the sync; an open transaction rolls back on
                    // drop. The entry is removed so shutdown leaves no
                    // acquired ghosts; the next schedule tick re-enqueues.
                    self.queue.remove(request.kind, request.id, true);
                    break;
                }
                _ = self.sync_perms(&request) => {}
            }
        }

        tracing::info!("sync loop stopped");
    }

    /// The background scheduling loop.
    async fn run_schedule(&self, cancel: CancellationToken) {
        tracing::debug!("schedule loop started");

        let mut ticker = tokio::time::interval(self.options.schedule_interval);
        // The first tick of a tokio interval completes immediately; consume
        // it so scheduling starts one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !self.background_sync_enabled() {
                continue;
            }

            match scheduler::compute_schedule(&self.db, &self.options).await {
                Ok(schedule) => {
                    self.schedule_scheduled_users(schedule.users);
                    self.schedule_scheduled_repos(schedule.repos);
                }
                Err(error) => {
                    tracing::error!(error = %error, "failed to compute schedule");
                }
            }
        }

        tracing::info!("schedule loop stopped");
    }

    /// Periodically sample staleness metrics from the store and the queue
    /// size from memory.
    async fn collect_metrics(&self, cancel: CancellationToken) {
        tracing::debug!("metrics loop started");

        let mut ticker = tokio::time::interval(self.options.metrics_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match store::perms::permissions_metrics(
                &self.db,
                (self.clock)(),
                self.options.stale_cutoff,
            )
            .await
            {
                Ok(m) => {
                    metrics::set_stale_perms("user", m.users_with_stale_perms);
                    metrics::set_perms_gap_seconds("user", m.users_perms_gap_seconds);
                    metrics::set_stale_perms("repo", m.repos_with_stale_perms);
                    metrics::set_perms_gap_seconds("repo", m.repos_perms_gap_seconds);
                }
                Err(error) => {
                    tracing::error!(error = %error, "failed to get metrics from store");
                    continue;
                }
            }

            metrics::set_queue_size(self.queue.len());
        }

        tracing::info!("metrics loop stopped");
    }

    /// Kick off the permissions syncing process. Blocks until the
    /// cancellation token fires; all three loops observe the same token.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("permissions syncer started");

        tokio::join!(
            self.run_sync(cancel.clone()),
            self.run_schedule(cancel.clone()),
            self.collect_metrics(cancel.clone()),
        );

        tracing::info!("permissions syncer stopped");
    }

    /// Snapshot the queue state for operator endpoints.
    pub fn debug_dump(&self) -> QueueDump {
        let entries = self.queue.snapshot();
        QueueDump {
            name: "permissions",
            size: entries.len(),
            queue: entries
                .into_iter()
                .map(|(meta, acquired)| QueueEntryDump {
                    kind: meta.kind,
                    id: meta.id,
                    priority: meta.priority,
                    next_sync_at: meta.next_sync_at,
                    acquired,
                })
                .collect(),
        }
    }

    /// The queue shared with the consumer loop. Exposed for tests and
    /// embedders that want to inspect scheduling state.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }
}
