use crate::entities::webhook::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id};
use crate::storage::{self, from_json_list, to_json_list};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Webhook {
    pub owner: String,
    pub name: String,
    pub created_time: String,

    pub organization: String,
    pub url: String,
    pub method: String,
    pub content_type: String,
    pub headers: Vec<WebhookHeader>,
    pub events: Vec<String>,
    pub is_user_extended: bool,
    pub single_org_only: bool,
    pub is_enabled: bool,

    pub max_retries: i32,
    /// Base retry delay in seconds
    pub retry_interval: i32,
    pub use_exponential_backoff: bool,
}

impl Webhook {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }

    fn from_model(m: Model) -> Result<Self, CoreError> {
        Ok(Self {
            headers: from_json_list(&m.headers)?,
            events: from_json_list(&m.events)?,
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            organization: m.organization,
            url: m.url,
            method: m.method,
            content_type: m.content_type,
            is_user_extended: m.is_user_extended,
            single_org_only: m.single_org_only,
            is_enabled: m.is_enabled,
            max_retries: m.max_retries,
            retry_interval: m.retry_interval,
            use_exponential_backoff: m.use_exponential_backoff,
        })
    }

    fn to_active_model(&self) -> Result<ActiveModel, CoreError> {
        Ok(ActiveModel {
            owner: Set(self.owner.clone()),
            name: Set(self.name.clone()),
            created_time: Set(self.created_time.clone()),
            organization: Set(self.organization.clone()),
            url: Set(self.url.clone()),
            method: Set(self.method.clone()),
            content_type: Set(self.content_type.clone()),
            headers: Set(to_json_list(&self.headers)?),
            events: Set(to_json_list(&self.events)?),
            is_user_extended: Set(self.is_user_extended),
            single_org_only: Set(self.single_org_only),
            is_enabled: Set(self.is_enabled),
            max_retries: Set(self.max_retries),
            retry_interval: Set(self.retry_interval),
            use_exponential_backoff: Set(self.use_exponential_backoff),
        })
    }
}

pub async fn get_webhook(db: &DatabaseConnection, id: &str) -> Result<Option<Webhook>, CoreError> {
    let (owner, name) = parse_id(id)?;
    match Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
    {
        Some(m) => Ok(Some(Webhook::from_model(m)?)),
        None => Ok(None),
    }
}

/// Webhooks of one organization; an empty organization selects all webhooks.
pub async fn get_webhooks_by_organization(
    db: &DatabaseConnection,
    organization: &str,
) -> Result<Vec<Webhook>, CoreError> {
    let mut query = Entity::find().order_by_asc(Column::CreatedTime);
    if !organization.is_empty() {
        query = query.filter(Column::Organization.eq(organization));
    }
    query
        .all(db)
        .await?
        .into_iter()
        .map(Webhook::from_model)
        .collect()
}

pub async fn add_webhook(db: &DatabaseConnection, webhook: &Webhook) -> Result<bool, CoreError> {
    let mut webhook = webhook.clone();
    if webhook.created_time.is_empty() {
        webhook.created_time = storage::now();
    }
    match Entity::insert(webhook.to_active_model()?)
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await
    {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn update_webhook(
    db: &DatabaseConnection,
    id: &str,
    webhook: &Webhook,
) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::update_many()
        .set(webhook.to_active_model()?)
        .filter(Column::Owner.eq(owner))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

pub async fn delete_webhook(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Enabled webhooks subscribed to `action` that accept events from `organization`.
pub fn get_filtered_webhooks(webhooks: Vec<Webhook>, organization: &str, action: &str) -> Vec<Webhook> {
    webhooks
        .into_iter()
        .filter(|w| w.is_enabled)
        .filter(|w| !w.single_org_only || w.organization == organization)
        .filter(|w| w.events.iter().any(|e| e == action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(name: &str, org: &str, events: &[&str]) -> Webhook {
        Webhook {
            owner: "admin".to_string(),
            name: name.to_string(),
            organization: org.to_string(),
            events: events.iter().map(|s| s.to_string()).collect(),
            is_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_skips_disabled() {
        let mut disabled = webhook("w1", "org", &["login"]);
        disabled.is_enabled = false;

        let res = get_filtered_webhooks(vec![disabled, webhook("w2", "org", &["login"])], "org", "login");

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].name, "w2");
    }

    #[test]
    fn test_filter_single_org_only() {
        let mut scoped = webhook("scoped", "org-a", &["login"]);
        scoped.single_org_only = true;
        let global = webhook("global", "org-a", &["login"]);

        let res = get_filtered_webhooks(vec![scoped, global], "org-b", "login");

        assert_eq!(res.len(), 1);
        assert_eq!(res[0].name, "global");
    }

    #[test]
    fn test_filter_requires_subscribed_action() {
        let res = get_filtered_webhooks(vec![webhook("w", "org", &["signup"])], "org", "login");
        assert!(res.is_empty());
    }
}
