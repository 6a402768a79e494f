use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub created_time: String,
    pub display_name: String,
    pub description: String,
    pub users: String,     // JSON array of user ids
    pub roles: String,     // JSON array of role ids
    pub domains: String,   // JSON array
    pub model: String,     // policy model name (or "owner/name"), empty = built-in
    pub adapter: String,   // policy adapter name or table, empty = default table
    pub resource_type: String,
    pub resources: String, // JSON array
    pub actions: String,   // JSON array
    pub effect: String,
    pub is_enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
