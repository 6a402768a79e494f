use crate::authz::model::CompiledModel;
use crate::entities::policy_model::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id, permission};
use crate::storage;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyModel {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub display_name: String,
    pub description: String,
    pub model_text: String,
}

impl PolicyModel {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }
}

impl From<Model> for PolicyModel {
    fn from(m: Model) -> Self {
        Self {
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            display_name: m.display_name,
            description: m.description,
            model_text: m.model_text,
        }
    }
}

impl From<&PolicyModel> for ActiveModel {
    fn from(m: &PolicyModel) -> Self {
        ActiveModel {
            owner: Set(m.owner.clone()),
            name: Set(m.name.clone()),
            created_time: Set(m.created_time.clone()),
            display_name: Set(m.display_name.clone()),
            description: Set(m.description.clone()),
            model_text: Set(m.model_text.clone()),
        }
    }
}

pub async fn get_model(db: &DatabaseConnection, id: &str) -> Result<Option<PolicyModel>, CoreError> {
    let (owner, name) = parse_id(id)?;
    Ok(Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
        .map(PolicyModel::from))
}

pub async fn get_models(db: &DatabaseConnection, owner: &str) -> Result<Vec<PolicyModel>, CoreError> {
    Ok(Entity::find()
        .filter(Column::Owner.eq(owner))
        .order_by_desc(Column::CreatedTime)
        .all(db)
        .await?
        .into_iter()
        .map(PolicyModel::from)
        .collect())
}

/// Insert a model. The text must compile.
pub async fn add_model(db: &DatabaseConnection, model: &PolicyModel) -> Result<bool, CoreError> {
    CompiledModel::compile(&model.model_text).await?;

    let mut model = model.clone();
    if model.created_time.is_empty() {
        model.created_time = storage::now();
    }
    match Entity::insert(ActiveModel::from(&model))
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await
    {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Replace the model stored under `id`. A rename is carried into the
/// permissions that reference the model by name.
pub async fn update_model(
    db: &DatabaseConnection,
    id: &str,
    model: &PolicyModel,
) -> Result<bool, CoreError> {
    CompiledModel::compile(&model.model_text).await?;

    let (owner, name) = parse_id(id)?;
    let res = Entity::update_many()
        .set(ActiveModel::from(model))
        .filter(Column::Owner.eq(owner))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Ok(false);
    }

    if model.owner == owner && model.name != name {
        permission::rename_model_references(db, owner, name, &model.name).await?;
    }
    Ok(true)
}

pub async fn delete_model(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}
