//! Permission level enum for access-control rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Permission levels granted by a code host.
///
/// Repository permissions are currently a single bit: either an identity can
/// read a repository or it cannot. The enum leaves room for further levels
/// without a schema change.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum PermLevel {
    #[sea_orm(string_value = "read")]
    #[default]
    Read,
}

impl std::fmt::Display for PermLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermLevel::Read => write!(f, "read"),
        }
    }
}
