//! Repo entity - repositories mirrored from external code hosts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Repo model. Rows carry both the internal numeric ID and the identity the
/// owning code host assigned to the repository.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repos")]
pub struct Model {
    /// Internal numeric ID.
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Repository name as displayed by the platform.
    pub name: String,
    /// Whether the repository is private on the code host.
    pub private: bool,

    // ─── External Identity ───────────────────────────────────────────────────
    /// Kind of code host that owns the repository (e.g. "gitlab").
    pub service_type: String,
    /// Identity of the code-host instance (e.g. "https://gitlab.example.com/").
    pub service_id: String,
    /// Opaque repository ID assigned by the code host.
    pub external_id: String,

    /// When the row was created.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
