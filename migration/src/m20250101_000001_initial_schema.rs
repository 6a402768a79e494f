use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create permissions table
        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(string(Permissions::Owner))
                    .col(string(Permissions::Name))
                    .col(string(Permissions::CreatedTime))
                    .col(string(Permissions::DisplayName))
                    .col(string(Permissions::Description))
                    .col(text(Permissions::Users))
                    .col(text(Permissions::Roles))
                    .col(text(Permissions::Domains))
                    .col(string(Permissions::Model))
                    .col(string(Permissions::Adapter))
                    .col(string(Permissions::ResourceType))
                    .col(text(Permissions::Resources))
                    .col(text(Permissions::Actions))
                    .col(string(Permissions::Effect))
                    .col(boolean(Permissions::IsEnabled))
                    .primary_key(
                        Index::create()
                            .col(Permissions::Owner)
                            .col(Permissions::Name),
                    )
                    .to_owned(),
            )
            .await?;

        // Create roles table
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(string(Roles::Owner))
                    .col(string(Roles::Name))
                    .col(string(Roles::CreatedTime))
                    .col(string(Roles::DisplayName))
                    .col(string(Roles::Description))
                    .col(text(Roles::Users))
                    .col(text(Roles::Roles))
                    .col(text(Roles::Domains))
                    .col(boolean(Roles::IsEnabled))
                    .primary_key(Index::create().col(Roles::Owner).col(Roles::Name))
                    .to_owned(),
            )
            .await?;

        // Create policy_models table
        manager
            .create_table(
                Table::create()
                    .table(PolicyModels::Table)
                    .if_not_exists()
                    .col(string(PolicyModels::Owner))
                    .col(string(PolicyModels::Name))
                    .col(string(PolicyModels::CreatedTime))
                    .col(string(PolicyModels::DisplayName))
                    .col(string(PolicyModels::Description))
                    .col(text(PolicyModels::ModelText))
                    .primary_key(
                        Index::create()
                            .col(PolicyModels::Owner)
                            .col(PolicyModels::Name),
                    )
                    .to_owned(),
            )
            .await?;

        // Create policy_adapters table
        manager
            .create_table(
                Table::create()
                    .table(PolicyAdapters::Table)
                    .if_not_exists()
                    .col(string(PolicyAdapters::Owner))
                    .col(string(PolicyAdapters::Name))
                    .col(string(PolicyAdapters::CreatedTime))
                    .col(string(PolicyAdapters::TableName))
                    .primary_key(
                        Index::create()
                            .col(PolicyAdapters::Owner)
                            .col(PolicyAdapters::Name),
                    )
                    .to_owned(),
            )
            .await?;

        // Create the shared default policy table
        manager
            .create_table(
                Table::create()
                    .table(PermissionRule::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionRule::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(rule_col(PermissionRule::Ptype))
                    .col(rule_col(PermissionRule::V0))
                    .col(rule_col(PermissionRule::V1))
                    .col(rule_col(PermissionRule::V2))
                    .col(rule_col(PermissionRule::V3))
                    .col(rule_col(PermissionRule::V4))
                    .col(rule_col(PermissionRule::V5))
                    .to_owned(),
            )
            .await?;

        // Filtered loads always select on v5
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permission_rule_v5")
                    .table(PermissionRule::Table)
                    .col(PermissionRule::V5)
                    .to_owned(),
            )
            .await?;

        // Create job_executions table with backend-specific ID type
        let id_col = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(JobExecutions::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(JobExecutions::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(id_col)
                    .col(string(JobExecutions::JobName))
                    .col(big_integer(JobExecutions::StartedAt))
                    .col(big_integer_null(JobExecutions::CompletedAt))
                    .col(boolean_null(JobExecutions::Success))
                    .col(string_null(JobExecutions::ErrorMessage))
                    .col(big_integer_null(JobExecutions::RecordsProcessed))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_executions_started")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PermissionRule::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PolicyAdapters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PolicyModels::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn rule_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .string()
        .not_null()
        .default("")
        .to_owned()
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Owner,
    Name,
    CreatedTime,
    DisplayName,
    Description,
    Users,
    Roles,
    Domains,
    Model,
    Adapter,
    ResourceType,
    Resources,
    Actions,
    Effect,
    IsEnabled,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Owner,
    Name,
    CreatedTime,
    DisplayName,
    Description,
    Users,
    Roles,
    Domains,
    IsEnabled,
}

#[derive(DeriveIden)]
enum PolicyModels {
    Table,
    Owner,
    Name,
    CreatedTime,
    DisplayName,
    Description,
    ModelText,
}

#[derive(DeriveIden)]
enum PolicyAdapters {
    Table,
    Owner,
    Name,
    CreatedTime,
    TableName,
}

#[derive(DeriveIden)]
enum PermissionRule {
    Table,
    Id,
    Ptype,
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    RecordsProcessed,
}
