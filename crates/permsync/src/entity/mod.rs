//! SeaORM entity definitions for the permsync database schema.

pub mod external_account;
pub mod pending_permissions;
pub mod perm_level;
pub mod prelude;
pub mod repo;
pub mod repo_permissions;
pub mod user;
pub mod user_permissions;
