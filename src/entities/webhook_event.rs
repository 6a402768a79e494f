use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub created_time: String,
    pub updated_time: String,
    pub webhook_name: String,
    pub organization: String,
    pub event_type: String,
    pub status: String, // "pending" | "retrying" | "success" | "failed"
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    #[sea_orm(column_type = "Text")]
    pub extended_user: String,
    pub attempt_count: i32,
    pub max_retries: i32,
    pub next_retry_time: String, // RFC 3339, empty = due now
    pub last_status_code: i32,
    #[sea_orm(column_type = "Text")]
    pub last_response: String,
    #[sea_orm(column_type = "Text")]
    pub last_error: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
