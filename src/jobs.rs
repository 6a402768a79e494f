use crate::entities;
use crate::errors::CoreError;
use crate::webhook::worker::{WebhookWorker, DELIVERY_JOB};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, Set,
};
use tracing::{error, info};

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, CoreError> {
    use entities::job_execution;

    let execution = job_execution::ActiveModel {
        id: NotSet,
        job_name: Set(job_name.to_string()),
        started_at: Set(Utc::now().timestamp()),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
) -> Result<(), CoreError> {
    use entities::job_execution::{Column, Entity};

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(Utc::now().timestamp()));
        active.success = Set(Some(success));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.update(db).await?;
    }

    Ok(())
}

/// Run a job by name once, recording the execution.
///
/// The worker's polling loop goes through here for every tick.
pub async fn trigger_job_manually(worker: &WebhookWorker, job_name: &str) -> Result<(), CoreError> {
    let db = worker.db();

    if job_name != DELIVERY_JOB {
        return Err(CoreError::BadRequest(format!("Unknown job name: {}", job_name)));
    }

    let execution_id = start_job_execution(db, job_name).await?;
    match worker.process_webhook_events().await {
        Ok(count) => {
            if count > 0 {
                info!("Job {} completed: {} records", job_name, count);
            }
            complete_job_execution(db, execution_id, true, None, Some(count as i64)).await?;
        }
        Err(e) => {
            error!("Job {} failed: {}", job_name, e);
            complete_job_execution(db, execution_id, false, Some(e.to_string()), None).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings;
    use crate::webhook::sender::{DeliveryOutcome, WebhookSender};
    use crate::object::{Record, Webhook};
    use migration::MigratorTrait;
    use sea_orm::Database;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    struct NoopSender;

    #[async_trait::async_trait]
    impl WebhookSender for NoopSender {
        async fn send(&self, _: &Webhook, _: &Record, _: Option<&serde_json::Value>) -> DeliveryOutcome {
            DeliveryOutcome::default()
        }
    }

    async fn test_db() -> (DatabaseConnection, NamedTempFile) {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let db = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");
        migration::Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");
        (db, temp_file)
    }

    #[tokio::test]
    async fn test_job_execution_lifecycle() {
        let (db, _temp) = test_db().await;

        let id = start_job_execution(&db, DELIVERY_JOB)
            .await
            .expect("Failed to start job execution");
        complete_job_execution(&db, id, true, None, Some(5))
            .await
            .expect("Failed to complete job execution");

        let execution = entities::job_execution::Entity::find_by_id(id)
            .one(&db)
            .await
            .expect("Failed to query")
            .expect("Execution not found");
        assert_eq!(execution.success, Some(true));
        assert_eq!(execution.records_processed, Some(5));
        assert!(execution.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_trigger_records_delivery_tick() {
        let (db, _temp) = test_db().await;
        let worker = WebhookWorker::new(db.clone(), Arc::new(NoopSender), settings::Webhook::default());

        trigger_job_manually(&worker, DELIVERY_JOB)
            .await
            .expect("Failed to trigger job");

        let executions = entities::job_execution::Entity::find()
            .all(&db)
            .await
            .expect("Failed to query");
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].job_name, DELIVERY_JOB);
        assert_eq!(executions[0].records_processed, Some(0));
    }

    #[tokio::test]
    async fn test_unknown_job_rejected() {
        let (db, _temp) = test_db().await;
        let worker = WebhookWorker::new(db, Arc::new(NoopSender), settings::Webhook::default());

        assert!(trigger_job_manually(&worker, "cleanup").await.is_err());
    }
}
