//! Initial migration to create the permsync database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_users(manager).await?;
        self.create_repos(manager).await?;
        self.create_external_accounts(manager).await?;
        self.create_user_permissions(manager).await?;
        self.create_repo_permissions(manager).await?;
        self.create_pending_permissions(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PendingPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RepoPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExternalAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Repos::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_users(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_username")
                    .table(Users::Table)
                    .col(Users::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_repos(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repos::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Repos::Name).string().not_null())
                    .col(
                        ColumnDef::new(Repos::Private)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    // External identity
                    .col(ColumnDef::new(Repos::ServiceType).string().not_null())
                    .col(ColumnDef::new(Repos::ServiceId).string().not_null())
                    .col(ColumnDef::new(Repos::ExternalId).string().not_null())
                    .col(
                        ColumnDef::new(Repos::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique constraint on the code-host identity
        manager
            .create_index(
                Index::create()
                    .name("idx_repos_external_identity")
                    .table(Repos::Table)
                    .col(Repos::ServiceType)
                    .col(Repos::ServiceId)
                    .col(Repos::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repos_private")
                    .table(Repos::Table)
                    .col(Repos::Private)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_external_accounts(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExternalAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExternalAccounts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExternalAccounts::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalAccounts::ServiceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalAccounts::ServiceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalAccounts::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExternalAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_external_accounts_user")
                            .from(ExternalAccounts::Table, ExternalAccounts::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // One binding per code-host account
        manager
            .create_index(
                Index::create()
                    .name("idx_external_accounts_identity")
                    .table(ExternalAccounts::Table)
                    .col(ExternalAccounts::ServiceType)
                    .col(ExternalAccounts::ServiceId)
                    .col(ExternalAccounts::AccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_external_accounts_user_id")
                    .table(ExternalAccounts::Table)
                    .col(ExternalAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_user_permissions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserPermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserPermissions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserPermissions::Permission)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserPermissions::ObjectIds)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserPermissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserPermissions::UserId)
                            .col(UserPermissions::Permission),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_permissions_updated_at")
                    .table(UserPermissions::Table)
                    .col(UserPermissions::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_repo_permissions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RepoPermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RepoPermissions::RepoId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepoPermissions::Permission)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepoPermissions::UserIds)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepoPermissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(RepoPermissions::RepoId)
                            .col(RepoPermissions::Permission),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repo_permissions_updated_at")
                    .table(RepoPermissions::Table)
                    .col(RepoPermissions::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_pending_permissions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PendingPermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PendingPermissions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::ServiceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::ServiceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::Permission)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::ObjectIds)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingPermissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One pending row per code-host account and permission level
        manager
            .create_index(
                Index::create()
                    .name("idx_pending_permissions_identity")
                    .table(PendingPermissions::Table)
                    .col(PendingPermissions::ServiceType)
                    .col(PendingPermissions::ServiceId)
                    .col(PendingPermissions::AccountId)
                    .col(PendingPermissions::Permission)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Repos {
    Table,
    Id,
    Name,
    Private,
    ServiceType,
    ServiceId,
    ExternalId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ExternalAccounts {
    Table,
    Id,
    UserId,
    ServiceType,
    ServiceId,
    AccountId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserPermissions {
    Table,
    UserId,
    Permission,
    ObjectIds,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RepoPermissions {
    Table,
    RepoId,
    Permission,
    UserIds,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PendingPermissions {
    Table,
    Id,
    ServiceType,
    ServiceId,
    AccountId,
    Permission,
    ObjectIds,
    UpdatedAt,
}
