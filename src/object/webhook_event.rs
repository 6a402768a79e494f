use crate::entities::webhook_event::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id, webhook, Record, Webhook};
use crate::storage;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retry budget given to events whose webhook does not set one.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookEventStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Retrying,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventStatus::Pending => "pending",
            WebhookEventStatus::Success => "success",
            WebhookEventStatus::Failed => "failed",
            WebhookEventStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for WebhookEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WebhookEventStatus::Pending),
            "success" => Ok(WebhookEventStatus::Success),
            "failed" => Ok(WebhookEventStatus::Failed),
            "retrying" => Ok(WebhookEventStatus::Retrying),
            other => Err(CoreError::BadRequest(format!(
                "unknown webhook event status `{}`",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookEvent {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub updated_time: String,

    /// Id (`owner/name`) of the webhook to deliver to
    pub webhook_name: String,
    pub organization: String,
    pub event_type: String,
    pub status: WebhookEventStatus,

    /// JSON-encoded [`Record`]
    pub payload: String,
    /// JSON-encoded user, empty when the webhook is not user-extended
    pub extended_user: String,

    pub attempt_count: i32,
    pub max_retries: i32,
    pub next_retry_time: String,

    pub last_status_code: i32,
    pub last_response: String,
    pub last_error: String,
}

impl WebhookEvent {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }

    fn from_model(m: Model) -> Result<Self, CoreError> {
        Ok(Self {
            status: m.status.parse()?,
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            updated_time: m.updated_time,
            webhook_name: m.webhook_name,
            organization: m.organization,
            event_type: m.event_type,
            payload: m.payload,
            extended_user: m.extended_user,
            attempt_count: m.attempt_count,
            max_retries: m.max_retries,
            next_retry_time: m.next_retry_time,
            last_status_code: m.last_status_code,
            last_response: m.last_response,
            last_error: m.last_error,
        })
    }

    fn to_active_model(&self) -> ActiveModel {
        ActiveModel {
            owner: Set(self.owner.clone()),
            name: Set(self.name.clone()),
            created_time: Set(self.created_time.clone()),
            updated_time: Set(self.updated_time.clone()),
            webhook_name: Set(self.webhook_name.clone()),
            organization: Set(self.organization.clone()),
            event_type: Set(self.event_type.clone()),
            status: Set(self.status.as_str().to_string()),
            payload: Set(self.payload.clone()),
            extended_user: Set(self.extended_user.clone()),
            attempt_count: Set(self.attempt_count),
            max_retries: Set(self.max_retries),
            next_retry_time: Set(self.next_retry_time.clone()),
            last_status_code: Set(self.last_status_code),
            last_response: Set(self.last_response.clone()),
            last_error: Set(self.last_error.clone()),
        }
    }
}

/// Selection for listing and replaying events. Empty strings match anything.
#[derive(Debug, Clone, Default)]
pub struct WebhookEventFilter {
    pub owner: String,
    pub organization: String,
    pub webhook_name: String,
    pub status: Option<WebhookEventStatus>,
    pub offset: u64,
    pub limit: u64,
}

fn from_models(models: Vec<Model>) -> Result<Vec<WebhookEvent>, CoreError> {
    models.into_iter().map(WebhookEvent::from_model).collect()
}

pub async fn get_webhook_event(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<WebhookEvent>, CoreError> {
    let (owner, name) = parse_id(id)?;
    match Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
    {
        Some(m) => Ok(Some(WebhookEvent::from_model(m)?)),
        None => Ok(None),
    }
}

/// Newest first.
pub async fn get_webhook_events(
    db: &DatabaseConnection,
    filter: &WebhookEventFilter,
) -> Result<Vec<WebhookEvent>, CoreError> {
    let mut query = Entity::find().order_by_desc(Column::CreatedTime);
    if !filter.owner.is_empty() {
        query = query.filter(Column::Owner.eq(filter.owner.as_str()));
    }
    if !filter.organization.is_empty() {
        query = query.filter(Column::Organization.eq(filter.organization.as_str()));
    }
    if !filter.webhook_name.is_empty() {
        query = query.filter(Column::WebhookName.eq(filter.webhook_name.as_str()));
    }
    if let Some(status) = filter.status {
        query = query.filter(Column::Status.eq(status.as_str()));
    }
    if filter.offset > 0 {
        query = query.offset(filter.offset);
    }
    if filter.limit > 0 {
        query = query.limit(filter.limit);
    }
    from_models(query.all(db).await?)
}

/// Events that are due for delivery, oldest first.
pub async fn get_pending_webhook_events(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<WebhookEvent>, CoreError> {
    let now = storage::now();
    let models = Entity::find()
        .filter(Column::Status.is_in([
            WebhookEventStatus::Pending.as_str(),
            WebhookEventStatus::Retrying.as_str(),
        ]))
        .filter(
            Condition::any()
                .add(Column::NextRetryTime.eq(""))
                .add(Column::NextRetryTime.lte(now)),
        )
        .order_by_asc(Column::CreatedTime)
        .order_by_asc(Column::Name)
        .limit(limit)
        .all(db)
        .await?;
    from_models(models)
}

/// Insert an event, filling in a generated name, timestamps and `pending`.
pub async fn add_webhook_event(
    db: &DatabaseConnection,
    event: &mut WebhookEvent,
) -> Result<bool, CoreError> {
    if event.name.is_empty() {
        event.name = storage::random_id();
    }
    let now = storage::now();
    if event.created_time.is_empty() {
        event.created_time = now.clone();
    }
    if event.updated_time.is_empty() {
        event.updated_time = now;
    }

    match Entity::insert(event.to_active_model())
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await
    {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Overwrite every column of the event stored under `id`.
pub async fn update_webhook_event(
    db: &DatabaseConnection,
    id: &str,
    event: &mut WebhookEvent,
) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    event.updated_time = storage::now();
    let res = Entity::update_many()
        .set(event.to_active_model())
        .filter(Column::Owner.eq(owner))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Record the outcome of a delivery attempt.
///
/// Besides the outcome columns this persists `attempt_count` and
/// `next_retry_time` as currently set on `event`.
pub async fn update_webhook_event_status(
    db: &DatabaseConnection,
    event: &mut WebhookEvent,
    status: WebhookEventStatus,
    status_code: i32,
    response: &str,
    error: Option<&str>,
) -> Result<bool, CoreError> {
    event.status = status;
    event.last_status_code = status_code;
    event.last_response = response.to_string();
    event.last_error = error.unwrap_or_default().to_string();
    event.updated_time = storage::now();

    let res = Entity::update_many()
        .col_expr(Column::Status, Expr::value(event.status.as_str()))
        .col_expr(Column::LastStatusCode, Expr::value(event.last_status_code))
        .col_expr(Column::LastResponse, Expr::value(event.last_response.clone()))
        .col_expr(Column::LastError, Expr::value(event.last_error.clone()))
        .col_expr(Column::UpdatedTime, Expr::value(event.updated_time.clone()))
        .col_expr(Column::AttemptCount, Expr::value(event.attempt_count))
        .col_expr(Column::NextRetryTime, Expr::value(event.next_retry_time.clone()))
        .filter(Column::Owner.eq(event.owner.as_str()))
        .filter(Column::Name.eq(event.name.as_str()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

pub async fn delete_webhook_event(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Persist a pending event carrying `record` for `webhook`.
pub async fn create_webhook_event_from_record(
    db: &DatabaseConnection,
    webhook: &Webhook,
    record: &Record,
    extended_user: Option<&serde_json::Value>,
) -> Result<WebhookEvent, CoreError> {
    let mut event = WebhookEvent {
        owner: webhook.owner.clone(),
        webhook_name: webhook.id(),
        organization: record.organization.clone(),
        event_type: record.action.clone(),
        status: WebhookEventStatus::Pending,
        payload: serde_json::to_string(record)?,
        extended_user: match extended_user {
            Some(user) => serde_json::to_string(user)?,
            None => String::new(),
        },
        attempt_count: 0,
        max_retries: if webhook.max_retries > 0 {
            webhook.max_retries
        } else {
            DEFAULT_MAX_RETRIES
        },
        ..Default::default()
    };

    add_webhook_event(db, &mut event).await?;
    Ok(event)
}

/// Create one pending event per webhook subscribed to the record's action.
///
/// `extended_user` is attached only for user-extended webhooks.
pub async fn enqueue_webhook_events(
    db: &DatabaseConnection,
    record: &Record,
    extended_user: Option<&serde_json::Value>,
) -> Result<Vec<WebhookEvent>, CoreError> {
    let webhooks = webhook::get_webhooks_by_organization(db, "").await?;
    let webhooks = webhook::get_filtered_webhooks(webhooks, &record.organization, &record.action);

    let mut events = Vec::with_capacity(webhooks.len());
    for webhook in &webhooks {
        let user = if webhook.is_user_extended {
            extended_user
        } else {
            None
        };
        let event = create_webhook_event_from_record(db, webhook, record, user).await?;
        tracing::debug!(event = %event.id(), webhook = %webhook.id(), "Queued webhook event");
        events.push(event);
    }
    Ok(events)
}
