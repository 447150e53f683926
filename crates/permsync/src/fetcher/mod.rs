//! Permissions fetchers: the capability contract between the sync engine and
//! per-code-host authorization providers.
//!
//! A [`PermsFetcher`] lists, for one code-host instance, which private repos
//! an account can read (user-centric) and which accounts can read a repo
//! (repository-centric). Implementations register with the
//! [`FetcherRegistry`] at startup; the engine resolves fetchers by service
//! ID and treats absence as "do not sync".
//!
//! Fetch methods return [`FetchResult`] so an interrupted fetch still hands
//! back the partial data alongside the error.

mod errors;
mod rate_limit;
mod registry;
mod types;

pub use errors::{FetcherError, Result};
pub use rate_limit::{ApiRateLimiter, RateLimitedFetcher};
pub use registry::FetcherRegistry;
pub use types::{
    ExternalAccountId, ExternalAccounts, ExternalRepoId, ExternalRepoSpec, FetchResult,
    PermsFetcher,
};
