//! Core fetcher types: the capability trait, code-host identity types, and
//! the partial-result carrier.

use async_trait::async_trait;

use crate::entity::external_account::Model as ExternalAccount;

use super::errors::FetcherError;

/// Opaque repository ID assigned by a code host.
pub type ExternalRepoId = String;

/// Opaque account ID assigned by a code host.
pub type ExternalAccountId = String;

/// Full identity of a repository on a code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRepoSpec {
    /// Repository ID on the code host.
    pub id: ExternalRepoId,
    /// Kind of code host (e.g. "gitlab").
    pub service_type: String,
    /// Identity of the code-host instance.
    pub service_id: String,
}

/// A batch of code-host account IDs scoped to one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccounts {
    /// Kind of code host the accounts live on.
    pub service_type: String,
    /// Identity of the code-host instance.
    pub service_id: String,
    /// Account IDs on that host.
    pub account_ids: Vec<ExternalAccountId>,
}

/// Outcome of a permissions fetch: the IDs gathered so far plus an optional
/// error encountered along the way.
///
/// Permissions APIs are expensive and often paginated, so a fetch that fails
/// halfway still carries the pages it managed to read. Callers always get
/// the partial data and decide what to do with the error; the data is never
/// discarded on their behalf.
#[derive(Debug, Default)]
pub struct FetchResult<T> {
    /// IDs gathered before the fetch finished or failed.
    pub ids: Vec<T>,
    /// The error that interrupted the fetch, if any.
    pub error: Option<FetcherError>,
}

impl<T> FetchResult<T> {
    /// A fully successful fetch.
    pub fn ok(ids: Vec<T>) -> Self {
        Self { ids, error: None }
    }

    /// A fetch that produced nothing before failing.
    pub fn failed(error: FetcherError) -> Self {
        Self {
            ids: Vec::new(),
            error: Some(error),
        }
    }

    /// A fetch interrupted partway: some IDs plus the error that stopped it.
    pub fn partial(ids: Vec<T>, error: FetcherError) -> Self {
        Self {
            ids,
            error: Some(error),
        }
    }

    /// Whether the fetch completed without error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Capability trait for code hosts that can enumerate read permissions in
/// both user-centric and repository-centric ways.
///
/// Implementations are per code-host-instance API clients registered with
/// the [`FetcherRegistry`](super::FetcherRegistry) at startup. The sync
/// engine only ever calls the four methods below.
///
/// # Implementation Notes
///
/// Implementors should:
/// - Handle pagination internally for both fetch operations
/// - Return partial results with the error when a fetch is interrupted
///   (see [`FetchResult`])
/// - Include permissions inherited through group/team membership in
///   [`fetch_repo_perms`](Self::fetch_repo_perms)
/// - Only ever return private repositories from
///   [`fetch_user_perms`](Self::fetch_user_perms)
#[async_trait]
pub trait PermsFetcher: Send + Sync {
    /// Kind of code host this fetcher talks to (e.g. "bitbucketServer").
    fn service_type(&self) -> &str;

    /// Identity of the code-host instance (e.g. "https://gitlab.example.com/").
    fn service_id(&self) -> &str;

    /// List the private repositories (by code-host ID) the given account can
    /// read, both directly and through inherited membership.
    async fn fetch_user_perms(&self, account: &ExternalAccount) -> FetchResult<ExternalRepoId>;

    /// List the code-host account IDs with read access to the given
    /// repository, both directly and through inherited membership.
    async fn fetch_repo_perms(&self, repo: &ExternalRepoSpec) -> FetchResult<ExternalAccountId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_result_constructors() {
        let ok: FetchResult<ExternalRepoId> = FetchResult::ok(vec!["e1".to_string()]);
        assert!(ok.is_complete());
        assert_eq!(ok.ids.len(), 1);

        let failed: FetchResult<ExternalRepoId> =
            FetchResult::failed(FetcherError::network("boom"));
        assert!(!failed.is_complete());
        assert!(failed.ids.is_empty());

        let partial =
            FetchResult::partial(vec!["e1".to_string()], FetcherError::network("cut short"));
        assert!(!partial.is_complete());
        assert_eq!(partial.ids.len(), 1);
    }
}
