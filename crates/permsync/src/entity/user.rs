//! User entity - platform-internal user accounts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User model. Internal IDs are the platform's 32-bit identifiers widened to
/// fit the column type.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Internal numeric ID.
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name.
    pub username: String,
    /// When the user was created.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// A user may have several external accounts bound to it.
    #[sea_orm(has_many = "super::external_account::Entity")]
    ExternalAccount,
}

impl Related<super::external_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExternalAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
