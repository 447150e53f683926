//! Repository listing for the sync engine.
//!
//! The engine resolves code-host repo identities to internal rows and checks
//! privacy flags through this thin query layer.

use sea_orm::sea_query::Condition;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::repo;
use crate::fetcher::ExternalRepoSpec;

use super::errors::{Result, StoreError};

/// Filters for [`list_repos`]. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ListReposArgs {
    /// Restrict to these internal IDs.
    pub ids: Vec<u32>,
    /// Restrict to repositories matching any of these code-host identities.
    pub external_repos: Vec<ExternalRepoSpec>,
    /// Restrict to private repositories.
    pub private_only: bool,
}

impl ListReposArgs {
    /// Filter by internal IDs.
    pub fn by_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Filter by code-host identities, optionally restricted to private repos.
    pub fn by_external_repos(external_repos: Vec<ExternalRepoSpec>, private_only: bool) -> Self {
        Self {
            external_repos,
            private_only,
            ..Self::default()
        }
    }
}

fn build_condition(args: &ListReposArgs) -> Condition {
    let mut condition = Condition::all();

    if !args.ids.is_empty() {
        condition = condition.add(repo::Column::Id.is_in(args.ids.iter().map(|id| i64::from(*id))));
    }

    if !args.external_repos.is_empty() {
        let mut any = Condition::any();
        for spec in &args.external_repos {
            any = any.add(
                Condition::all()
                    .add(repo::Column::ServiceType.eq(&spec.service_type))
                    .add(repo::Column::ServiceId.eq(&spec.service_id))
                    .add(repo::Column::ExternalId.eq(&spec.id)),
            );
        }
        condition = condition.add(any);
    }

    if args.private_only {
        condition = condition.add(repo::Column::Private.eq(true));
    }

    condition
}

/// List repository rows matching the given filters, ordered by internal ID.
pub async fn list_repos<C: ConnectionTrait>(
    conn: &C,
    args: &ListReposArgs,
) -> Result<Vec<repo::Model>> {
    repo::Entity::find()
        .filter(build_condition(args))
        .order_by_asc(repo::Column::Id)
        .all(conn)
        .await
        .map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, QueryTrait};

    fn spec(service_type: &str, service_id: &str, id: &str) -> ExternalRepoSpec {
        ExternalRepoSpec {
            id: id.to_string(),
            service_type: service_type.to_string(),
            service_id: service_id.to_string(),
        }
    }

    fn build_sql(args: &ListReposArgs) -> String {
        repo::Entity::find()
            .filter(build_condition(args))
            .build(DatabaseBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn external_repo_filter_builds_per_spec_conjunctions() {
        let args = ListReposArgs::by_external_repos(
            vec![spec("gitlab", "https://gitlab.example.com/", "e1")],
            true,
        );
        let sql = build_sql(&args);
        assert!(sql.contains("service_type"), "sql: {sql}");
        assert!(sql.contains("external_id"), "sql: {sql}");
        assert!(sql.contains("private"), "sql: {sql}");
    }

    #[test]
    fn id_filter_uses_in_clause() {
        let args = ListReposArgs::by_ids([5, 9]);
        let sql = build_sql(&args);
        assert!(sql.contains("IN"), "sql: {sql}");
    }

    #[test]
    fn default_args_match_everything() {
        let args = ListReposArgs::default();
        assert!(args.ids.is_empty());
        assert!(args.external_repos.is_empty());
        assert!(!args.private_only);
    }
}
