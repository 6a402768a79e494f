use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhooks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub created_time: String,
    pub organization: String,
    pub url: String,
    pub method: String,
    pub content_type: String,
    pub headers: String, // JSON array of {name, value}
    pub events: String,  // JSON array of action names
    pub is_user_extended: bool,
    pub single_org_only: bool,
    pub is_enabled: bool,
    pub max_retries: i32,
    pub retry_interval: i32, // seconds
    pub use_exponential_backoff: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
