use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create webhooks table
        manager
            .create_table(
                Table::create()
                    .table(Webhooks::Table)
                    .if_not_exists()
                    .col(string(Webhooks::Owner))
                    .col(string(Webhooks::Name))
                    .col(string(Webhooks::CreatedTime))
                    .col(string(Webhooks::Organization))
                    .col(string(Webhooks::Url))
                    .col(string(Webhooks::Method))
                    .col(string(Webhooks::ContentType))
                    .col(text(Webhooks::Headers))
                    .col(text(Webhooks::Events))
                    .col(boolean(Webhooks::IsUserExtended))
                    .col(boolean(Webhooks::SingleOrgOnly))
                    .col(boolean(Webhooks::IsEnabled))
                    .col(
                        ColumnDef::new(Webhooks::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Webhooks::RetryInterval)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(boolean(Webhooks::UseExponentialBackoff))
                    .primary_key(Index::create().col(Webhooks::Owner).col(Webhooks::Name))
                    .to_owned(),
            )
            .await?;

        // Create webhook_events table
        manager
            .create_table(
                Table::create()
                    .table(WebhookEvents::Table)
                    .if_not_exists()
                    .col(string(WebhookEvents::Owner))
                    .col(string(WebhookEvents::Name))
                    .col(string(WebhookEvents::CreatedTime))
                    .col(string(WebhookEvents::UpdatedTime))
                    .col(string(WebhookEvents::WebhookName))
                    .col(string(WebhookEvents::Organization))
                    .col(string(WebhookEvents::EventType))
                    .col(string(WebhookEvents::Status))
                    .col(text(WebhookEvents::Payload))
                    .col(text(WebhookEvents::ExtendedUser))
                    .col(
                        ColumnDef::new(WebhookEvents::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::NextRetryTime)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::LastStatusCode)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(text(WebhookEvents::LastResponse))
                    .col(text(WebhookEvents::LastError))
                    .primary_key(
                        Index::create()
                            .col(WebhookEvents::Owner)
                            .col(WebhookEvents::Name),
                    )
                    .to_owned(),
            )
            .await?;

        // The delivery worker polls by status
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_webhook_events_status")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_webhook_events_webhook")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::WebhookName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Webhooks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Webhooks {
    Table,
    Owner,
    Name,
    CreatedTime,
    Organization,
    Url,
    Method,
    ContentType,
    Headers,
    Events,
    IsUserExtended,
    SingleOrgOnly,
    IsEnabled,
    MaxRetries,
    RetryInterval,
    UseExponentialBackoff,
}

#[derive(DeriveIden)]
enum WebhookEvents {
    Table,
    Owner,
    Name,
    CreatedTime,
    UpdatedTime,
    WebhookName,
    Organization,
    EventType,
    Status,
    Payload,
    ExtendedUser,
    AttemptCount,
    MaxRetries,
    NextRetryTime,
    LastStatusCode,
    LastResponse,
    LastError,
}
