use crate::entities::permission::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id, scoped_id};
use crate::storage::{self, from_json_list, to_json_list};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permission {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub display_name: String,
    pub description: String,

    pub users: Vec<String>,
    pub roles: Vec<String>,
    pub domains: Vec<String>,

    pub model: String,
    pub adapter: String,
    pub resource_type: String,
    pub resources: Vec<String>,
    pub actions: Vec<String>,
    pub effect: String,
    pub is_enabled: bool,
}

impl Permission {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }

    /// Id of the policy model, or `None` for the built-in model.
    pub fn model_id(&self) -> Option<String> {
        if self.model.is_empty() {
            None
        } else {
            Some(scoped_id(&self.owner, &self.model))
        }
    }

    /// Key under which permissions sharing one enforcer are grouped.
    pub fn model_adapter_key(&self) -> String {
        format!("{}|{}", self.model, self.adapter)
    }

    fn from_model(m: Model) -> Result<Self, CoreError> {
        Ok(Self {
            users: from_json_list(&m.users)?,
            roles: from_json_list(&m.roles)?,
            domains: from_json_list(&m.domains)?,
            resources: from_json_list(&m.resources)?,
            actions: from_json_list(&m.actions)?,
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            display_name: m.display_name,
            description: m.description,
            model: m.model,
            adapter: m.adapter,
            resource_type: m.resource_type,
            effect: m.effect,
            is_enabled: m.is_enabled,
        })
    }

    fn to_active_model(&self) -> Result<ActiveModel, CoreError> {
        Ok(ActiveModel {
            owner: Set(self.owner.clone()),
            name: Set(self.name.clone()),
            created_time: Set(self.created_time.clone()),
            display_name: Set(self.display_name.clone()),
            description: Set(self.description.clone()),
            users: Set(to_json_list(&self.users)?),
            roles: Set(to_json_list(&self.roles)?),
            domains: Set(to_json_list(&self.domains)?),
            model: Set(self.model.clone()),
            adapter: Set(self.adapter.clone()),
            resource_type: Set(self.resource_type.clone()),
            resources: Set(to_json_list(&self.resources)?),
            actions: Set(to_json_list(&self.actions)?),
            effect: Set(self.effect.clone()),
            is_enabled: Set(self.is_enabled),
        })
    }
}

fn from_models(models: Vec<Model>) -> Result<Vec<Permission>, CoreError> {
    models.into_iter().map(Permission::from_model).collect()
}

pub async fn get_permission(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<Permission>, CoreError> {
    let (owner, name) = parse_id(id)?;
    match Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
    {
        Some(m) => Ok(Some(Permission::from_model(m)?)),
        None => Ok(None),
    }
}

pub async fn get_permissions(
    db: &DatabaseConnection,
    owner: &str,
) -> Result<Vec<Permission>, CoreError> {
    let models = Entity::find()
        .filter(Column::Owner.eq(owner))
        .order_by_desc(Column::CreatedTime)
        .all(db)
        .await?;
    from_models(models)
}

/// Permissions whose `roles` list names `role_id`.
pub async fn get_permissions_by_role(
    db: &DatabaseConnection,
    role_id: &str,
) -> Result<Vec<Permission>, CoreError> {
    let models = Entity::find()
        .filter(Column::Roles.contains(format!("\"{}\"", role_id)))
        .all(db)
        .await?;
    Ok(from_models(models)?
        .into_iter()
        .filter(|p| p.roles.iter().any(|r| r == role_id))
        .collect())
}

/// Permissions whose `users` list names `user_id` directly.
pub async fn get_permissions_by_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<Permission>, CoreError> {
    let models = Entity::find()
        .filter(Column::Users.contains(format!("\"{}\"", user_id)))
        .all(db)
        .await?;
    Ok(from_models(models)?
        .into_iter()
        .filter(|p| p.users.iter().any(|u| u == user_id))
        .collect())
}

pub async fn get_permissions_by_model(
    db: &DatabaseConnection,
    owner: &str,
    model: &str,
) -> Result<Vec<Permission>, CoreError> {
    let models = Entity::find()
        .filter(Column::Owner.eq(owner))
        .filter(Column::Model.eq(model))
        .all(db)
        .await?;
    from_models(models)
}

/// Group permission ids by their `model|adapter` key, keeping first-seen order.
pub fn group_permissions_by_model_adapter(permissions: &[Permission]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for permission in permissions {
        let key = permission.model_adapter_key();
        let id = permission.id();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, ids)) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            None => groups.push((key, vec![id])),
        }
    }
    groups
}

/// Insert the permission row. Only the row; derived policies are written by
/// the synchronizer.
pub async fn insert_permission(
    db: &DatabaseConnection,
    permission: &Permission,
) -> Result<bool, CoreError> {
    let mut permission = permission.clone();
    if permission.created_time.is_empty() {
        permission.created_time = storage::now();
    }
    let res = Entity::insert(permission.to_active_model()?)
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await;
    match res {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Overwrite the row stored under `id`, which may rename it.
pub async fn update_permission_row(
    db: &DatabaseConnection,
    id: &str,
    permission: &Permission,
) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::update_many()
        .set(permission.to_active_model()?)
        .filter(Column::Owner.eq(owner))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

pub async fn delete_permission_row(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Rewrite role references from `old_id` to `new_id` in every permission.
pub async fn rename_role_references(
    db: &DatabaseConnection,
    old_id: &str,
    new_id: &str,
) -> Result<usize, CoreError> {
    let permissions = get_permissions_by_role(db, old_id).await?;
    let count = permissions.len();
    for mut permission in permissions {
        for role in permission.roles.iter_mut() {
            if role == old_id {
                *role = new_id.to_string();
            }
        }
        update_permission_row(db, &permission.id(), &permission).await?;
    }
    Ok(count)
}

/// Rewrite model references in the permissions of `owner`.
pub async fn rename_model_references(
    db: &DatabaseConnection,
    owner: &str,
    old_name: &str,
    new_name: &str,
) -> Result<usize, CoreError> {
    let res = Entity::update_many()
        .col_expr(Column::Model, sea_orm::sea_query::Expr::value(new_name))
        .filter(Column::Owner.eq(owner))
        .filter(Column::Model.eq(old_name))
        .exec(db)
        .await?;
    Ok(res.rows_affected as usize)
}
