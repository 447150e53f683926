//! Common re-exports for convenient entity usage.

pub use super::external_account::{
    ActiveModel as ExternalAccountActiveModel, Column as ExternalAccountColumn,
    Entity as ExternalAccount, Model as ExternalAccountModel,
};
pub use super::pending_permissions::{
    ActiveModel as PendingPermissionsActiveModel, Column as PendingPermissionsColumn,
    Entity as PendingPermissions, Model as PendingPermissionsModel,
};
pub use super::perm_level::PermLevel;
pub use super::repo::{
    ActiveModel as RepoActiveModel, Column as RepoColumn, Entity as Repo, Model as RepoModel,
};
pub use super::repo_permissions::{
    ActiveModel as RepoPermissionsActiveModel, Column as RepoPermissionsColumn,
    Entity as RepoPermissionsEntity, Model as RepoPermissionsModel,
};
pub use super::user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as User, Model as UserModel,
};
pub use super::user_permissions::{
    ActiveModel as UserPermissionsActiveModel, Column as UserPermissionsColumn,
    Entity as UserPermissionsEntity, Model as UserPermissionsModel,
};
