//! RepoPermissions entity - per-repository sets of users with read access.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::perm_level::PermLevel;

/// RepoPermissions model. One row per `(repo, permission)` pair; the user
/// IDs are a roaring bitmap of internal user IDs serialized to a BLOB.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repo_permissions")]
pub struct Model {
    /// Internal repo ID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub repo_id: i64,
    /// Permission level this row grants.
    #[sea_orm(primary_key, auto_increment = false)]
    pub permission: PermLevel,

    /// Serialized roaring bitmap of user IDs with access to the repo.
    pub user_ids: Vec<u8>,

    /// When the row was last written by a sync.
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
