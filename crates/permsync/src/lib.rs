//! Permsync - background permissions synchronization for code-host-backed
//! platforms.
//!
//! This library keeps a read-permission mapping between users and private
//! repositories continuously refreshed against one or more external code
//! hosts (Bitbucket Server, GitLab, and friends). Foreground request paths
//! consume the synchronized store to enforce authorization without ever
//! blocking on a code-host round trip.
//!
//! # Features
//!
//! - `sqlite` / `postgres` - Database backends for the permissions store.
//! - `migrate` - Enables migration support. When enabled, use
//!   [`connect_and_migrate`] to run migrations on connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permsync::fetcher::FetcherRegistry;
//! use permsync::sync::{PermsSyncer, Priority};
//! use tokio_util::sync::CancellationToken;
//!
//! let db = permsync::connect_and_migrate("postgres:///permsync").await?;
//!
//! let registry = Arc::new(FetcherRegistry::new());
//! registry.register_rate_limited(my_gitlab_fetcher, 5);
//!
//! let syncer = Arc::new(PermsSyncer::new(db, registry));
//! let cancel = CancellationToken::new();
//!
//! tokio::spawn({
//!     let syncer = Arc::clone(&syncer);
//!     let cancel = cancel.clone();
//!     async move { syncer.run(cancel).await }
//! });
//!
//! // A user just logged in; refresh their permissions promptly.
//! syncer.schedule_users(Priority::High, &[42]);
//! ```

pub mod db;
pub mod entity;
pub mod fetcher;
pub mod metrics;
pub mod store;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use fetcher::{
    ApiRateLimiter, FetchResult, FetcherError, FetcherRegistry, PermsFetcher, RateLimitedFetcher,
};
pub use store::{PermsMetrics, RepoPermissions, StoreError, UserPermissions};
pub use sync::{PermsSyncer, Priority, RequestKind, SyncError, SyncerOptions};
