//! User to group membership stored as casbin role assignments.
//!
//! Groups live in the same role namespace as ordinary roles, distinguished
//! by the `group:` prefix, which is added on write and stripped on read.

use casbin::{CoreApi, DefaultModel, Enforcer, RbacApi};
use sea_orm::DatabaseConnection;

use crate::authz::adapter::SeaOrmAdapter;
use crate::authz::errors::AuthzError;
use crate::errors::CoreError;
use crate::settings;

pub const GROUP_PREFIX: &str = "group:";

const USER_GROUP_MODEL: &str = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

fn group_role(group: &str) -> String {
    format!("{}{}", GROUP_PREFIX, group)
}

fn groups_only(roles: Vec<String>) -> Vec<String> {
    roles
        .into_iter()
        .filter_map(|r| r.strip_prefix(GROUP_PREFIX).map(str::to_string))
        .collect()
}

pub struct UserGroupEnforcer {
    enforcer: Enforcer,
}

impl UserGroupEnforcer {
    /// Open the enforcer over the configured membership table, creating it if needed.
    pub async fn new(db: DatabaseConnection, cfg: &settings::Policy) -> Result<Self, CoreError> {
        let table = format!("{}{}", cfg.table_name_prefix, cfg.user_group_table);
        let adapter = SeaOrmAdapter::new(db, &table).await?;
        let model = DefaultModel::from_str(USER_GROUP_MODEL)
            .await
            .map_err(|e| AuthzError::Configuration(format!("invalid user group model: {}", e)))?;
        let enforcer = Enforcer::new(model, adapter).await.map_err(AuthzError::from)?;
        Ok(Self { enforcer })
    }

    pub async fn add_group_for_user(&mut self, user: &str, group: &str) -> Result<bool, CoreError> {
        let added = self
            .enforcer
            .add_role_for_user(user, &group_role(group), None)
            .await
            .map_err(AuthzError::from)?;
        tracing::debug!(user = %user, group = %group, added, "Added group for user");
        Ok(added)
    }

    pub async fn add_groups_for_user(&mut self, user: &str, groups: &[String]) -> Result<bool, CoreError> {
        if groups.is_empty() {
            return Ok(false);
        }
        let roles = groups.iter().map(|g| group_role(g)).collect();
        Ok(self
            .enforcer
            .add_roles_for_user(user, roles, None)
            .await
            .map_err(AuthzError::from)?)
    }

    pub async fn delete_group_for_user(&mut self, user: &str, group: &str) -> Result<bool, CoreError> {
        Ok(self
            .enforcer
            .delete_role_for_user(user, &group_role(group), None)
            .await
            .map_err(AuthzError::from)?)
    }

    /// Remove every group of the user. Plain role assignments are kept.
    pub async fn delete_groups_for_user(&mut self, user: &str) -> Result<bool, CoreError> {
        let mut deleted = false;
        for group in self.get_groups_for_user(user) {
            deleted |= self.delete_group_for_user(user, &group).await?;
        }
        Ok(deleted)
    }

    /// Group names of the user, prefix stripped.
    pub fn get_groups_for_user(&mut self, user: &str) -> Vec<String> {
        groups_only(self.enforcer.get_roles_for_user(user, None))
    }

    /// Members of the group; empty for an unknown group.
    pub fn get_all_users_by_group(&self, group: &str) -> Vec<String> {
        self.enforcer.get_users_for_role(&group_role(group), None)
    }

    /// Replace the user's groups with `groups`.
    pub async fn update_groups_for_user(&mut self, user: &str, groups: &[String]) -> Result<bool, CoreError> {
        self.delete_groups_for_user(user).await?;
        if groups.is_empty() {
            return Ok(true);
        }
        self.add_groups_for_user(user, groups).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_only_strips_prefix_and_skips_roles() {
        let roles = vec![
            "group:finance".to_string(),
            "org/admin".to_string(),
            "group:ops".to_string(),
        ];

        assert_eq!(groups_only(roles), vec!["finance", "ops"]);
    }
}
