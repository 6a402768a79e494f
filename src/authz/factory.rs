use casbin::{Adapter, CoreApi, Enforcer, Filter, MgmtApi};
use sea_orm::DatabaseConnection;

use crate::authz::adapter::SeaOrmAdapter;
use crate::authz::errors::AuthzError;
use crate::authz::model::CompiledModel;
use crate::authz::types::RULE_WIDTH;
use crate::errors::CoreError;
use crate::object::{policy_adapter, policy_model, Permission};
use crate::settings;

/// Builds per-permission enforcers over a policy table.
///
/// Nothing is cached: every call reads the model and the permission's rows
/// afresh, and the returned enforcer is meant to be dropped after use.
#[derive(Clone)]
pub struct EnforcerFactory {
    db: DatabaseConnection,
    table_prefix: String,
    default_table: String,
}

impl EnforcerFactory {
    pub fn new(db: DatabaseConnection, cfg: &settings::Policy) -> Self {
        Self {
            db,
            table_prefix: cfg.table_name_prefix.clone(),
            default_table: cfg.default_table.clone(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Physical table (prefix applied) holding the permission's rows.
    pub async fn table_for(&self, permission: &Permission) -> Result<String, CoreError> {
        let table = policy_adapter::resolve_table_name(&self.db, &permission.owner, &permission.adapter)
            .await?
            .unwrap_or_else(|| self.default_table.clone());
        Ok(format!("{}{}", self.table_prefix, table))
    }

    pub fn is_default_table(&self, table: &str) -> bool {
        table == format!("{}{}", self.table_prefix, self.default_table)
    }

    /// The permission's model, or the built-in one when it names none.
    pub async fn model_for(&self, permission: &Permission) -> Result<CompiledModel, CoreError> {
        let Some(model_id) = permission.model_id() else {
            return Ok(CompiledModel::built_in().await?);
        };

        match policy_model::get_model(&self.db, &model_id).await? {
            Some(model) => Ok(CompiledModel::compile(&model.model_text).await?),
            None => {
                tracing::warn!(
                    permission = %permission.id(),
                    model = %model_id,
                    "Policy model not found, using the built-in model"
                );
                Ok(CompiledModel::built_in().await?)
            }
        }
    }

    /// Enforcer loaded with the rows of this one permission.
    pub async fn build(&self, permission: &Permission) -> Result<PermissionEnforcer, CoreError> {
        let model = self.model_for(permission).await?;
        let table = self.table_for(permission).await?;
        self.build_with(model, table, &[permission.id()]).await
    }

    /// One enforcer for several permissions that share a model and adapter.
    ///
    /// The model and table come from the first permission.
    pub async fn build_for_group(
        &self,
        permissions: &[Permission],
    ) -> Result<PermissionEnforcer, CoreError> {
        let first = permissions
            .first()
            .ok_or_else(|| CoreError::BadRequest("no permissions to build an enforcer for".to_string()))?;
        let model = self.model_for(first).await?;
        let table = self.table_for(first).await?;
        let ids: Vec<String> = permissions.iter().map(Permission::id).collect();
        self.build_with(model, table, &ids).await
    }

    async fn build_with(
        &self,
        model: CompiledModel,
        table: String,
        permission_ids: &[String],
    ) -> Result<PermissionEnforcer, CoreError> {
        // 1. Adapter bound to the table; construction faults are configuration faults
        let mut adapter = SeaOrmAdapter::new(self.db.clone(), &table).await?;

        // 2. Fresh model, then only the rows anchored to these permissions
        let mut casbin_model = model.to_casbin().await?;
        for id in permission_ids {
            let mut anchor = vec![""; RULE_WIDTH];
            anchor[RULE_WIDTH - 1] = id.as_str();
            let filter = Filter {
                p: anchor.clone(),
                g: if model.has_role_definition() { anchor } else { Vec::new() },
            };
            adapter
                .load_filtered_policy(&mut casbin_model, filter)
                .await
                .map_err(AuthzError::from)?;
        }

        // 3. Enforcer over both
        let mut enforcer = Enforcer::new_raw(casbin_model, adapter)
            .await
            .map_err(AuthzError::from)?;
        if model.has_role_definition() {
            enforcer.build_role_links().map_err(AuthzError::from)?;
        }

        tracing::debug!(
            table = %table,
            permissions = ?permission_ids,
            "Built permission enforcer"
        );

        Ok(PermissionEnforcer {
            enforcer,
            model,
            table,
            permission_ids: permission_ids.to_vec(),
        })
    }
}

/// A casbin enforcer together with the compiled model it was built from.
pub struct PermissionEnforcer {
    enforcer: Enforcer,
    model: CompiledModel,
    table: String,
    permission_ids: Vec<String>,
}

impl PermissionEnforcer {
    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn permission_ids(&self) -> &[String] {
        &self.permission_ids
    }

    /// Turn write-through to the table on or off.
    pub fn set_auto_save(&mut self, enabled: bool) {
        self.enforcer.enable_auto_save(enabled);
    }

    /// Evaluate one request; the value count must match the request definition.
    pub fn enforce(&self, values: &[String]) -> Result<bool, AuthzError> {
        let e = &self.enforcer;
        let allowed = match values {
            [a, b] => e.enforce((a, b)),
            [a, b, c] => e.enforce((a, b, c)),
            [a, b, c, d] => e.enforce((a, b, c, d)),
            [a, b, c, d, f] => e.enforce((a, b, c, d, f)),
            [a, b, c, d, f, g] => e.enforce((a, b, c, d, f, g)),
            _ => {
                return Err(AuthzError::Enforcer(format!(
                    "unsupported request with {} values",
                    values.len()
                )))
            }
        }?;
        Ok(allowed)
    }

    pub fn policies(&self) -> Vec<Vec<String>> {
        self.enforcer.get_policy()
    }

    pub fn grouping_policies(&self) -> Vec<Vec<String>> {
        if self.model.has_role_definition() {
            self.enforcer.get_grouping_policy()
        } else {
            Vec::new()
        }
    }

    /// Distinct values of the named policy field, in load order.
    pub fn field_values(&self, field: &str, fallback_index: usize) -> Vec<String> {
        let index = self.model.policy_field_index(field).unwrap_or(fallback_index);
        let mut values: Vec<String> = Vec::new();
        for rule in self.policies() {
            if let Some(v) = rule.get(index) {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        values
    }

    /// Add the rules not loaded yet.
    pub async fn add_policies(&mut self, mut rules: Vec<Vec<String>>) -> Result<(), AuthzError> {
        let loaded = self.policies();
        rules.retain(|r| !loaded.contains(r));
        if !rules.is_empty() {
            self.enforcer.add_policies(rules).await?;
        }
        Ok(())
    }

    /// Remove the rules that are loaded.
    pub async fn remove_policies(&mut self, mut rules: Vec<Vec<String>>) -> Result<(), AuthzError> {
        let loaded = self.policies();
        rules.retain(|r| loaded.contains(r));
        if !rules.is_empty() {
            self.enforcer.remove_policies(rules).await?;
        }
        Ok(())
    }

    pub async fn add_grouping_policies(
        &mut self,
        mut rules: Vec<Vec<String>>,
    ) -> Result<(), AuthzError> {
        let loaded = self.grouping_policies();
        rules.retain(|r| !loaded.contains(r));
        if !rules.is_empty() && self.model.has_role_definition() {
            self.enforcer.add_grouping_policies(rules).await?;
        }
        Ok(())
    }

    pub async fn remove_grouping_policies(
        &mut self,
        mut rules: Vec<Vec<String>>,
    ) -> Result<(), AuthzError> {
        let loaded = self.grouping_policies();
        rules.retain(|r| loaded.contains(r));
        if !rules.is_empty() && self.model.has_role_definition() {
            self.enforcer.remove_grouping_policies(rules).await?;
        }
        Ok(())
    }

    pub fn build_role_links(&mut self) -> Result<(), AuthzError> {
        if self.model.has_role_definition() {
            self.enforcer.build_role_links()?;
        }
        Ok(())
    }
}
