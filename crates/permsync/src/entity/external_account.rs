//! ExternalAccount entity - code-host identities bound to internal users.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// ExternalAccount model. Binds a code-host account (identified by the
/// service type, service ID, and the host-assigned account ID) to an
/// internal user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "external_accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Internal user this account is bound to.
    pub user_id: i64,

    /// Kind of code host (e.g. "bitbucketServer").
    pub service_type: String,
    /// Identity of the code-host instance.
    pub service_id: String,
    /// Opaque account ID assigned by the code host.
    pub account_id: String,

    /// When the binding was created.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// An external account belongs to a user.
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
