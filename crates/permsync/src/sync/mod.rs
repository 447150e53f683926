//! The permissions synchronizer: request queue, background scheduler, and
//! the sync engine.
//!
//! # Module Structure
//!
//! - [`request`] - Request metadata: `Priority`, `RequestKind`, `RequestMeta`
//! - [`queue`] - Priority queue with keyed de-duplication and acquire/release
//! - [`scheduler`] - Periodic computation of background sync work
//! - [`engine`] - `PermsSyncer`: the consumer loop and both sync paths
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permsync::fetcher::FetcherRegistry;
//! use permsync::sync::{PermsSyncer, Priority};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Arc::new(FetcherRegistry::new());
//! registry.register(my_gitlab_fetcher);
//!
//! let syncer = Arc::new(PermsSyncer::new(db, registry));
//! let cancel = CancellationToken::new();
//!
//! // Foreground components request prompt syncs:
//! syncer.schedule_users(Priority::High, &[42]);
//!
//! // The background half runs until shutdown:
//! syncer.run(cancel).await;
//! ```

pub mod engine;
pub mod queue;
mod request;
mod scheduler;

pub use engine::{Clock, PermsSyncer, QueueDump, QueueEntryDump, SyncError, SyncerOptions};
pub use queue::RequestQueue;
pub use request::{Priority, RequestKind, RequestMeta};
