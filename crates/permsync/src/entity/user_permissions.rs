//! UserPermissions entity - per-user sets of readable private repositories.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::perm_level::PermLevel;

/// UserPermissions model. One row per `(user, permission)` pair; the object
/// IDs are a roaring bitmap of internal repo IDs serialized to a BLOB.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_permissions")]
pub struct Model {
    /// Internal user ID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    /// Permission level this row grants.
    #[sea_orm(primary_key, auto_increment = false)]
    pub permission: PermLevel,

    /// Serialized roaring bitmap of repo IDs the user can access.
    pub object_ids: Vec<u8>,

    /// When the row was last written by a sync.
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
