//! PendingPermissions entity - permissions for code-host accounts not yet
//! bound to any internal user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::perm_level::PermLevel;

/// PendingPermissions model. Keyed by the full code-host identity of an
/// account (`service_type`, `service_id`, `account_id`) plus the permission
/// level. Rows accumulate repo IDs until the account is bound to an internal
/// user, at which point they are merged into `user_permissions` and deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Kind of code host the account lives on.
    pub service_type: String,
    /// Identity of the code-host instance.
    pub service_id: String,
    /// Opaque account ID assigned by the code host.
    pub account_id: String,
    /// Permission level this row grants.
    pub permission: PermLevel,

    /// Serialized roaring bitmap of repo IDs the account can access.
    pub object_ids: Vec<u8>,

    /// When the row was last written by a sync.
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
