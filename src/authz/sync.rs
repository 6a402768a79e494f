//! Keeps stored policy rows consistent with Permission and Role records.
//!
//! Tuples are regenerated wholesale: on every change the old derived tuples
//! are removed and the new ones added. Removal and re-adding are separate
//! writes, so a reader can briefly observe a permission without its rows.

use std::collections::HashSet;

use sea_orm::DatabaseConnection;

use crate::authz::adapter::SeaOrmAdapter;
use crate::authz::errors::AuthzError;
use crate::authz::factory::{EnforcerFactory, PermissionEnforcer};
use crate::errors::CoreError;
use crate::object::role::{self, Role, WILDCARD_ROLE};
use crate::object::{permission, Permission};
use crate::storage;

const DEFAULT_EFFECT: &str = "allow";

/// Policy tuples of a permission: `{users ∪ roles} × resources × actions`,
/// times each domain when there are any.
///
/// Rows are `[subject, resource, action, effect, "", permissionId]`, or
/// `[subject, domain, resource, action, effect, permissionId]` with domains.
/// Actions and the effect are lowercased.
pub fn get_policies(permission: &Permission) -> Vec<Vec<String>> {
    let permission_id = permission.id();
    let effect = if permission.effect.is_empty() {
        DEFAULT_EFFECT.to_string()
    } else {
        permission.effect.to_lowercase()
    };

    let mut policies = Vec::new();
    for subject in permission.users.iter().chain(permission.roles.iter()) {
        for resource in &permission.resources {
            for action in &permission.actions {
                let action = action.to_lowercase();
                if permission.domains.is_empty() {
                    policies.push(vec![
                        subject.clone(),
                        resource.clone(),
                        action,
                        effect.clone(),
                        String::new(),
                        permission_id.clone(),
                    ]);
                } else {
                    for domain in &permission.domains {
                        policies.push(vec![
                            subject.clone(),
                            domain.clone(),
                            resource.clone(),
                            action.clone(),
                            effect.clone(),
                            permission_id.clone(),
                        ]);
                    }
                }
            }
        }
    }
    dedup(policies)
}

fn grouping_for_role(role: &Role, domains: &[String], permission_id: &str) -> Vec<Vec<String>> {
    let role_id = role.id();
    let mut tuples = Vec::new();
    for member in role.users.iter().chain(role.roles.iter()) {
        if domains.is_empty() {
            tuples.push(vec![
                member.clone(),
                role_id.clone(),
                String::new(),
                String::new(),
                String::new(),
                permission_id.to_string(),
            ]);
        } else {
            for domain in domains {
                tuples.push(vec![
                    member.clone(),
                    role_id.clone(),
                    domain.clone(),
                    String::new(),
                    String::new(),
                    permission_id.to_string(),
                ]);
            }
        }
    }
    tuples
}

fn dedup(rules: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    rules.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

fn validation_fault(permission: &Permission, e: AuthzError) -> CoreError {
    tracing::warn!(permission = %permission.id(), error = %e, "Permission failed validation");
    AuthzError::Validation(e.to_string()).into()
}

pub struct PolicySynchronizer {
    factory: EnforcerFactory,
}

impl PolicySynchronizer {
    pub fn new(factory: EnforcerFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &EnforcerFactory {
        &self.factory
    }

    fn db(&self) -> &DatabaseConnection {
        self.factory.db()
    }

    /// Grouping tuples binding every member of each referenced role (and of
    /// the roles nested in it) to that role.
    ///
    /// Rows are `[member, roleId, domain or "", "", "", permissionId]`.
    pub async fn get_grouping_policies(
        &self,
        permission: &Permission,
    ) -> Result<Vec<Vec<String>>, CoreError> {
        let permission_id = permission.id();
        let mut tuples = Vec::new();
        for role_ref in &permission.roles {
            let role_id = if role_ref == WILDCARD_ROLE {
                storage::get_id(&permission.owner, WILDCARD_ROLE)
            } else {
                role_ref.clone()
            };
            for role in role::roles_in_role(self.db(), &role_id).await? {
                tuples.extend(grouping_for_role(&role, &permission.domains, &permission_id));
            }
        }
        Ok(dedup(tuples))
    }

    async fn write_tuples(
        &self,
        enforcer: &mut PermissionEnforcer,
        permission: &Permission,
        grouping: bool,
        policies: bool,
    ) -> Result<(), CoreError> {
        if grouping && enforcer.model().has_role_definition() {
            let tuples = self.get_grouping_policies(permission).await?;
            tracing::debug!(permission = %permission.id(), count = tuples.len(), "Adding grouping policies");
            enforcer.add_grouping_policies(tuples).await?;
        }
        if policies {
            let tuples = get_policies(permission);
            tracing::debug!(permission = %permission.id(), count = tuples.len(), "Adding policies");
            enforcer.add_policies(tuples).await?;
        }
        Ok(())
    }

    async fn erase_tuples(
        &self,
        enforcer: &mut PermissionEnforcer,
        permission: &Permission,
        grouping: bool,
        policies: bool,
    ) -> Result<(), CoreError> {
        if grouping && enforcer.model().has_role_definition() {
            let tuples = self.get_grouping_policies(permission).await?;
            tracing::debug!(permission = %permission.id(), count = tuples.len(), "Removing grouping policies");
            enforcer.remove_grouping_policies(tuples).await?;
        }
        if policies {
            let tuples = get_policies(permission);
            tracing::debug!(permission = %permission.id(), count = tuples.len(), "Removing policies");
            enforcer.remove_policies(tuples).await?;
        }
        Ok(())
    }

    /// Write the derived tuples of `permission` through its enforcer.
    pub async fn add_tuples(
        &self,
        permission: &Permission,
        grouping: bool,
        policies: bool,
    ) -> Result<(), CoreError> {
        let mut enforcer = self.factory.build(permission).await?;
        self.write_tuples(&mut enforcer, permission, grouping, policies).await
    }

    /// Remove the tuples `permission` derives as currently stored.
    pub async fn remove_tuples(
        &self,
        permission: &Permission,
        grouping: bool,
        policies: bool,
    ) -> Result<(), CoreError> {
        let mut enforcer = self.factory.build(permission).await?;
        self.erase_tuples(&mut enforcer, permission, grouping, policies).await
    }

    /// Dry-run the permission's tuples on a throwaway enforcer that never
    /// writes to the table.
    ///
    /// Clears `roles` when the model has no role relation.
    pub async fn check_permission_valid(&self, permission: &mut Permission) -> Result<(), CoreError> {
        // Construction faults are configuration faults, not validation ones
        let mut enforcer = self.factory.build(permission).await?;
        enforcer.set_auto_save(false);

        if !enforcer.model().has_role_definition() {
            permission.roles.clear();
        }

        let result = self.dry_run(&mut enforcer, permission).await;
        if result.is_err() && !self.factory.is_default_table(enforcer.table()) {
            // Building the enforcer may have created the table
            if let Err(e) = SeaOrmAdapter::drop_table_if_empty(self.db(), enforcer.table()).await {
                tracing::warn!(table = %enforcer.table(), error = %e, "Failed to drop empty policy table");
            }
        }
        result
    }

    async fn dry_run(&self, enforcer: &mut PermissionEnforcer, permission: &Permission) -> Result<(), CoreError> {
        let policies = get_policies(permission);
        enforcer
            .add_policies(policies.clone())
            .await
            .map_err(|e| validation_fault(permission, e))?;

        if enforcer.model().has_role_definition() {
            let grouping = self.get_grouping_policies(permission).await?;
            enforcer
                .add_grouping_policies(grouping)
                .await
                .map_err(|e| validation_fault(permission, e))?;
            enforcer
                .build_role_links()
                .map_err(|e| validation_fault(permission, e))?;
        }

        // Evaluate the matcher once against the permission's own first rule
        if let Some(rule) = policies.first() {
            let request = enforcer.model().request_for(rule);
            enforcer
                .enforce(&request)
                .map_err(|e| validation_fault(permission, e))?;
        }
        Ok(())
    }

    /// Insert the permission and write its tuples.
    pub async fn add_permission(&self, permission: &Permission) -> Result<bool, CoreError> {
        let mut permission = permission.clone();
        let model = self.factory.model_for(&permission).await?;
        if !model.has_role_definition() {
            permission.roles.clear();
        }

        if !permission::insert_permission(self.db(), &permission).await? {
            return Ok(false);
        }

        self.add_tuples(&permission, true, true).await?;
        tracing::info!(permission = %permission.id(), "Added permission");
        Ok(true)
    }

    /// Validate, overwrite the row stored under `id`, then regenerate tuples.
    ///
    /// Validation failures leave everything untouched. When the permission
    /// moved to another policy table the old one is dropped if left empty;
    /// a failed drop is reported after the new row and tuples are stored.
    pub async fn update_permission(&self, id: &str, permission: &Permission) -> Result<bool, CoreError> {
        let mut permission = permission.clone();
        self.check_permission_valid(&mut permission).await?;

        let Some(old) = permission::get_permission(self.db(), id).await? else {
            return Ok(false);
        };
        if !permission::update_permission_row(self.db(), id, &permission).await? {
            return Ok(false);
        }

        self.remove_tuples(&old, true, true).await?;
        self.add_tuples(&permission, true, true).await?;
        tracing::info!(permission = %permission.id(), "Updated permission");

        let old_table = self.factory.table_for(&old).await?;
        let new_table = self.factory.table_for(&permission).await?;
        if old_table != new_table && !self.factory.is_default_table(&old_table) {
            SeaOrmAdapter::drop_table_if_empty(self.db(), &old_table).await?;
        }
        Ok(true)
    }

    /// Delete the permission and its tuples; a private table left empty is dropped.
    pub async fn delete_permission(&self, id: &str) -> Result<bool, CoreError> {
        let Some(old) = permission::get_permission(self.db(), id).await? else {
            return Ok(false);
        };
        if !permission::delete_permission_row(self.db(), id).await? {
            return Ok(false);
        }

        self.remove_tuples(&old, true, true).await?;

        let table = self.factory.table_for(&old).await?;
        if !self.factory.is_default_table(&table) {
            SeaOrmAdapter::drop_table_if_empty(self.db(), &table).await?;
        }
        tracing::info!(permission = %id, "Deleted permission");
        Ok(true)
    }

    /// Permissions referencing `role_id`, then those referencing its
    /// ancestors, each once. The flag marks direct references.
    async fn affected_permissions(&self, role_id: &str) -> Result<Vec<(Permission, bool)>, CoreError> {
        let mut seen = HashSet::new();
        let mut affected = Vec::new();

        for p in permission::get_permissions_by_role(self.db(), role_id).await? {
            if seen.insert(p.id()) {
                affected.push((p, true));
            }
        }
        for ancestor in role::get_ancestor_roles(self.db(), &[role_id.to_string()]).await? {
            for p in permission::get_permissions_by_role(self.db(), &ancestor.id()).await? {
                if seen.insert(p.id()) {
                    affected.push((p, false));
                }
            }
        }
        Ok(affected)
    }

    /// Insert a role and bind its members in permissions that already
    /// reference it or one of its ancestors.
    pub async fn add_role(&self, role: &Role) -> Result<bool, CoreError> {
        if !role::insert_role(self.db(), role).await? {
            return Ok(false);
        }
        for (p, _) in self.affected_permissions(&role.id()).await? {
            self.add_tuples(&p, true, false).await?;
        }
        tracing::info!(role = %role.id(), "Added role");
        Ok(true)
    }

    pub async fn update_role(&self, id: &str, role: &Role) -> Result<bool, CoreError> {
        if role::get_role(self.db(), id).await?.is_none() {
            return Ok(false);
        }

        // 1. Remove what the current membership derives
        for (p, direct) in self.affected_permissions(id).await? {
            self.remove_tuples(&p, true, direct).await?;
        }

        // 2. Carry a rename into referencing permissions and roles
        let new_id = role.id();
        if new_id != id {
            permission::rename_role_references(self.db(), id, &new_id).await?;
            let (owner, _) = crate::object::parse_id(id)?;
            role::rename_nested_role_references(self.db(), owner, id, &new_id).await?;
        }

        let updated = role::update_role_row(self.db(), id, role).await?;

        // 3. Re-derive under the new id
        for (p, direct) in self.affected_permissions(&new_id).await? {
            self.add_tuples(&p, true, direct).await?;
        }
        tracing::info!(role = %new_id, "Updated role");
        Ok(updated)
    }

    /// Delete a role. Permissions that referenced it keep their other tuples.
    pub async fn delete_role(&self, id: &str) -> Result<bool, CoreError> {
        let affected = self.affected_permissions(id).await?;
        for (p, direct) in &affected {
            self.remove_tuples(p, true, *direct).await?;
        }

        let deleted = role::delete_role_row(self.db(), id).await?;

        for (p, direct) in &affected {
            self.add_tuples(p, true, *direct).await?;
        }
        tracing::info!(role = %id, "Deleted role");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission() -> Permission {
        Permission {
            owner: "org".to_string(),
            name: "read-data".to_string(),
            users: vec!["org/alice".to_string()],
            resources: vec!["data1".to_string()],
            actions: vec!["Read".to_string(), "WRITE".to_string()],
            effect: "Allow".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_policies_lowercase_action_and_effect() {
        let policies = get_policies(&permission());

        assert_eq!(policies.len(), 2);
        assert_eq!(
            policies[0],
            vec!["org/alice", "data1", "read", "allow", "", "org/read-data"]
        );
        assert_eq!(policies[1][2], "write");
    }

    #[test]
    fn test_domain_expansion() {
        let mut p = permission();
        p.domains = vec!["tenant1".to_string(), "tenant2".to_string()];

        let policies = get_policies(&p);

        assert_eq!(policies.len(), 4);
        assert!(policies.iter().all(|r| r[5] == "org/read-data"));
        assert_eq!(
            policies[0],
            vec!["org/alice", "tenant1", "data1", "read", "allow", "org/read-data"]
        );
    }

    #[test]
    fn test_roles_are_policy_subjects() {
        let mut p = permission();
        p.roles = vec!["org/admin".to_string()];
        p.actions = vec!["read".to_string()];

        let subjects: Vec<String> = get_policies(&p).into_iter().map(|r| r[0].clone()).collect();

        assert_eq!(subjects, vec!["org/alice", "org/admin"]);
    }

    #[test]
    fn test_duplicate_inputs_yield_one_tuple() {
        let mut p = permission();
        p.actions = vec!["read".to_string(), "READ".to_string()];

        assert_eq!(get_policies(&p).len(), 1);
    }

    #[test]
    fn test_grouping_for_role_with_domains() {
        let role = Role {
            owner: "org".to_string(),
            name: "admin".to_string(),
            users: vec!["org/alice".to_string()],
            roles: vec!["org/ops".to_string()],
            ..Default::default()
        };

        let tuples = grouping_for_role(&role, &["tenant1".to_string()], "org/p");

        assert_eq!(
            tuples,
            vec![
                vec!["org/alice", "org/admin", "tenant1", "", "", "org/p"],
                vec!["org/ops", "org/admin", "tenant1", "", "", "org/p"],
            ]
        );
    }
}
