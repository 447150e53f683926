//! Store operations for permissions and repositories.
//!
//! Split into the permissions store proper ([`perms`]) and the repository
//! lookup queries the sync engine needs ([`repos`]). Functions are free
//! async functions over sea-orm connections; multi-write atomicity is
//! provided by the transactional entry points in [`perms`].

mod errors;
pub mod perms;
pub mod repos;

pub use errors::{Result, StoreError, is_retryable_error};
pub use perms::{
    DEFAULT_WRITE_BACKOFF_MS, DEFAULT_WRITE_RETRIES, PermsMetrics, RepoPermissions,
    UserPermissions,
};
pub use repos::ListReposArgs;
