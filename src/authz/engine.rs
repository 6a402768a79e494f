use std::collections::HashSet;

use sea_orm::DatabaseConnection;

use crate::authz::errors::AuthzError;
use crate::authz::factory::EnforcerFactory;
use crate::authz::types::PermissionRule;
use crate::errors::CoreError;
use crate::object::{permission, role, Permission};

/// Answers allow/deny questions against stored permissions.
///
/// Every call builds its enforcers afresh; nothing is cached between calls.
pub struct AuthzEngine {
    factory: EnforcerFactory,
}

impl AuthzEngine {
    pub fn new(factory: EnforcerFactory) -> Self {
        Self { factory }
    }

    fn db(&self) -> &DatabaseConnection {
        self.factory.db()
    }

    async fn permission(&self, id: &str) -> Result<Permission, CoreError> {
        permission::get_permission(self.db(), id)
            .await?
            .ok_or_else(|| AuthzError::PermissionNotFound(id.to_string()).into())
    }

    /// Evaluate one request against the permission named by `rule.id`.
    ///
    /// An unknown permission is an error; callers must treat it as a deny.
    pub async fn enforce(&self, rule: &PermissionRule) -> Result<bool, CoreError> {
        let permission = self.permission(&rule.id).await?;
        let enforcer = self.factory.build(&permission).await?;
        let allowed = enforcer.enforce(&rule.request_values())?;
        tracing::debug!(permission = %rule.id, allowed, "Enforced request");
        Ok(allowed)
    }

    /// Evaluate every rule against the enforcer of the first rule's permission.
    ///
    /// Rules naming another permission are still evaluated against the
    /// first one. Use [`AuthzEngine::batch_enforce_checked`] to reject
    /// such batches instead.
    pub async fn batch_enforce(&self, rules: &[PermissionRule]) -> Result<Vec<bool>, CoreError> {
        let Some(first) = rules.first() else {
            return Ok(Vec::new());
        };
        if let Some(other) = rules.iter().find(|r| r.id != first.id) {
            tracing::warn!(
                first = %first.id,
                other = %other.id,
                "Batch mixes permissions, evaluating all against the first"
            );
        }

        let permission = self.permission(&first.id).await?;
        let enforcer = self.factory.build(&permission).await?;
        rules
            .iter()
            .map(|r| enforcer.enforce(&r.request_values()).map_err(CoreError::from))
            .collect()
    }

    /// Like [`AuthzEngine::batch_enforce`] but fails on mixed permission ids.
    pub async fn batch_enforce_checked(
        &self,
        rules: &[PermissionRule],
    ) -> Result<Vec<bool>, CoreError> {
        if let Some(first) = rules.first() {
            if let Some(other) = rules.iter().find(|r| r.id != first.id) {
                return Err(AuthzError::MixedPermissionBatch {
                    first: first.id.clone(),
                    other: other.id.clone(),
                }
                .into());
            }
        }
        self.batch_enforce(rules).await
    }

    /// Permissions naming the user directly or through one of their roles.
    async fn permissions_of_user(&self, user_id: &str) -> Result<Vec<Permission>, CoreError> {
        let mut seen = HashSet::new();
        let mut permissions = Vec::new();

        for p in permission::get_permissions_by_user(self.db(), user_id).await? {
            if seen.insert(p.id()) {
                permissions.push(p);
            }
        }
        for r in role::get_roles_by_user(self.db(), user_id).await? {
            for p in permission::get_permissions_by_role(self.db(), &r.id()).await? {
                if seen.insert(p.id()) {
                    permissions.push(p);
                }
            }
        }
        Ok(permissions)
    }

    async fn collect_field(
        &self,
        user_id: &str,
        field: &str,
        fallback_index: usize,
    ) -> Result<Vec<String>, CoreError> {
        let mut values: Vec<String> = Vec::new();
        for p in self.permissions_of_user(user_id).await? {
            let enforcer = self.factory.build(&p).await?;
            for v in enforcer.field_values(field, fallback_index) {
                if !values.contains(&v) {
                    values.push(v);
                }
            }
        }
        Ok(values)
    }

    /// Every resource the user's permissions mention.
    pub async fn get_all_objects(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        self.collect_field(user_id, "obj", 1).await
    }

    /// Every action the user's permissions mention.
    pub async fn get_all_actions(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        self.collect_field(user_id, "act", 2).await
    }

    /// Ids of every role the user holds, nested ones included.
    pub async fn get_all_roles(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        Ok(role::get_roles_by_user(self.db(), user_id)
            .await?
            .iter()
            .map(role::Role::id)
            .collect())
    }

    /// Evaluate `request` once per `model|adapter` group of `permissions`.
    ///
    /// Each group's enforcer holds the rows of all its permissions.
    pub async fn enforce_by_permissions(
        &self,
        permissions: &[Permission],
        request: &[String],
    ) -> Result<Vec<(String, bool)>, CoreError> {
        let mut results = Vec::new();
        for (key, group) in group_by_key(permissions) {
            let enforcer = self.factory.build_for_group(&group).await?;
            results.push((key, enforcer.enforce(request)?));
        }
        Ok(results)
    }

    /// Batched form of [`AuthzEngine::enforce_by_permissions`].
    pub async fn batch_enforce_by_permissions(
        &self,
        permissions: &[Permission],
        requests: &[Vec<String>],
    ) -> Result<Vec<(String, Vec<bool>)>, CoreError> {
        let mut results = Vec::new();
        for (key, group) in group_by_key(permissions) {
            let enforcer = self.factory.build_for_group(&group).await?;
            let allowed = requests
                .iter()
                .map(|r| enforcer.enforce(r))
                .collect::<Result<Vec<_>, _>>()?;
            results.push((key, allowed));
        }
        Ok(results)
    }
}

fn group_by_key(permissions: &[Permission]) -> Vec<(String, Vec<Permission>)> {
    permission::group_permissions_by_model_adapter(permissions)
        .into_iter()
        .map(|(key, ids)| {
            let members = permissions
                .iter()
                .filter(|p| ids.contains(&p.id()))
                .cloned()
                .collect();
            (key, members)
        })
        .collect()
}
