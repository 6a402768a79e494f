use crate::entities::role::{ActiveModel, Column, Entity, Model};
use crate::errors::CoreError;
use crate::object::{owner_name_conflict, parse_id};
use crate::storage::{self, from_json_list, to_json_list};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Role name that stands for every role of the permission's owner.
pub const WILDCARD_ROLE: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Role {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub display_name: String,
    pub description: String,

    pub users: Vec<String>,
    pub roles: Vec<String>,
    pub domains: Vec<String>,
    pub is_enabled: bool,
}

impl Role {
    pub fn id(&self) -> String {
        storage::get_id(&self.owner, &self.name)
    }

    fn from_model(m: Model) -> Result<Self, CoreError> {
        Ok(Self {
            users: from_json_list(&m.users)?,
            roles: from_json_list(&m.roles)?,
            domains: from_json_list(&m.domains)?,
            owner: m.owner,
            name: m.name,
            created_time: m.created_time,
            display_name: m.display_name,
            description: m.description,
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
            is_enabled: Set(self.is_enabled),
        })
    }
}

pub async fn get_role(db: &DatabaseConnection, id: &str) -> Result<Option<Role>, CoreError> {
    let (owner, name) = parse_id(id)?;
    match Entity::find_by_id((owner.to_string(), name.to_string()))
        .one(db)
        .await?
    {
        Some(m) => Ok(Some(Role::from_model(m)?)),
        None => Ok(None),
    }
}

pub async fn get_roles(db: &DatabaseConnection, owner: &str) -> Result<Vec<Role>, CoreError> {
    Entity::find()
        .filter(Column::Owner.eq(owner))
        .order_by_asc(Column::CreatedTime)
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(Role::from_model)
        .collect()
}

/// Roles the user belongs to directly, followed by every role that contains
/// one of them.
pub async fn get_roles_by_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<Role>, CoreError> {
    let direct: Vec<Role> = Entity::find()
        .filter(Column::Users.contains(format!("\"{}\"", user_id)))
        .all(db)
        .await?
        .into_iter()
        .map(Role::from_model)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|r| r.users.iter().any(|u| u == user_id))
        .collect();

    let ids: Vec<String> = direct.iter().map(Role::id).collect();
    get_ancestor_roles(db, &ids).await
}

/// The given roles plus all roles of the same owner that nest any of them,
/// directly or transitively.
pub async fn get_ancestor_roles(
    db: &DatabaseConnection,
    role_ids: &[String],
) -> Result<Vec<Role>, CoreError> {
    let Some(first) = role_ids.first() else {
        return Ok(Vec::new());
    };
    let (owner, _) = parse_id(first)?;
    let all_roles = get_roles(db, owner).await?;
    Ok(ancestors_in(&all_roles, role_ids))
}

fn ancestors_in(all_roles: &[Role], role_ids: &[String]) -> Vec<Role> {
    let mut parents: HashMap<&str, Vec<String>> = HashMap::new();
    for role in all_roles {
        let id = role.id();
        for sub in &role.roles {
            parents.entry(sub.as_str()).or_default().push(id.clone());
        }
    }

    // Walk upwards from the targets; the visited set handles cycles
    let mut found: HashSet<String> = role_ids.iter().cloned().collect();
    let mut queue: VecDeque<String> = role_ids.iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        for parent in parents.get(id.as_str()).into_iter().flatten() {
            if found.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
    }

    all_roles
        .iter()
        .filter(|role| found.contains(&role.id()))
        .cloned()
        .collect()
}

/// The role and every role nested inside it, each once.
///
/// `owner/*` expands to all roles of `owner`.
pub async fn roles_in_role(db: &DatabaseConnection, role_id: &str) -> Result<Vec<Role>, CoreError> {
    let (owner, name) = parse_id(role_id)?;
    if name == WILDCARD_ROLE {
        return get_roles(db, owner).await;
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut result = Vec::new();
    let mut stack = vec![role_id.to_string()];

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(role) = get_role(db, &id).await? else {
            continue;
        };
        for sub in role.roles.iter().rev() {
            if !visited.contains(sub) {
                stack.push(sub.clone());
            }
        }
        result.push(role);
    }

    Ok(result)
}

pub async fn insert_role(db: &DatabaseConnection, role: &Role) -> Result<bool, CoreError> {
    let mut role = role.clone();
    if role.created_time.is_empty() {
        role.created_time = storage::now();
    }
    match Entity::insert(role.to_active_model()?)
        .on_conflict(owner_name_conflict(Column::Owner, Column::Name))
        .exec(db)
        .await
    {
        Ok(_) => Ok(true),
        Err(sea_orm::DbErr::RecordNotInserted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn update_role_row(
    db: &DatabaseConnection,
    id: &str,
    role: &Role,
) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::update_many()
        .set(role.to_active_model()?)
        .filter(Column::Owner.eq(owner))
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

pub async fn delete_role_row(db: &DatabaseConnection, id: &str) -> Result<bool, CoreError> {
    let (owner, name) = parse_id(id)?;
    let res = Entity::delete_by_id((owner.to_string(), name.to_string()))
        .exec(db)
        .await?;
    Ok(res.rows_affected > 0)
}

/// Rewrite nested references from `old_id` to `new_id` in the roles of `owner`.
pub async fn rename_nested_role_references(
    db: &DatabaseConnection,
    owner: &str,
    old_id: &str,
    new_id: &str,
) -> Result<usize, CoreError> {
    let mut count = 0;
    for mut role in get_roles(db, owner).await? {
        if !role.roles.iter().any(|r| r == old_id) {
            continue;
        }
        for nested in role.roles.iter_mut() {
            if nested == old_id {
                *nested = new_id.to_string();
            }
        }
        update_role_row(db, &role.id(), &role).await?;
        count += 1;
    }
    Ok(count)
}
