use crate::entities::policy_adapter::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id, scoped_id};
use crate::storage;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};

/// Named binding of a permission's `adapter` field to a policy table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyAdapter {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub table_name: String,
}

impl PolicyAdapter {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }
}

impl From<Model> for PolicyAdapter {
    fn from(m: Model) -> Self {
        Self {
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            table_name: m.table_name,
        }
    }
}

pub async fn get_adapter(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<PolicyAdapter>, CoreError> {
    let (owner, name) = parse_id(id)?;
    Ok(Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
        .map(PolicyAdapter::from))
}

pub async fn add_adapter(db: &DatabaseConnection, adapter: &PolicyAdapter) -> Result<bool, CoreError> {
    let created_time = if adapter.created_time.is_empty() {
        storage::now()
    } else {
        adapter.created_time.clone()
    };
    let active = ActiveModel {
        owner: Set(adapter.owner.clone()),
        name: Set(adapter.name.clone()),
        created_time: Set(created_time),
        table_name: Set(adapter.table_name.clone()),
    };
    match Entity::insert(active)
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await
    {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_adapter(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Table named by a permission's `adapter` field.
///
/// `None` means the shared default table. A value naming an adapter record
/// resolves to that record's table; any other value is the table itself.
pub async fn resolve_table_name(
    db: &DatabaseConnection,
    owner: &str,
    adapter: &str,
) -> Result<Option<String>, CoreError> {
    if adapter.is_empty() {
        return Ok(None);
    }

    let id = scoped_id(owner, adapter);
    if storage::split_id(&id).is_some() {
        if let Some(record) = get_adapter(db, &id).await? {
            if !record.table_name.is_empty() {
                return Ok(Some(record.table_name));
            }
        }
    }
    Ok(Some(adapter.to_string()))
}
