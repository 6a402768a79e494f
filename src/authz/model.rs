use casbin::DefaultModel;

use crate::authz::errors::AuthzError;
use crate::authz::types::RULE_WIDTH;

/// Name of the policy field that carries the owning permission's id.
pub const PERMISSION_ID_FIELD: &str = "permissionId";

/// Model used by permissions that do not reference one.
///
/// The fourth policy field is the effect, so a `deny` permission never
/// grants; the empty fifth field is padding.
pub const BUILT_IN_MODEL: &str = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act, eft, "", permissionId

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

/// A policy model whose text has been checked and normalized.
///
/// Normalization pads the `p` definition to six fields with the last one
/// named `permissionId`, and names empty placeholder fields `v<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModel {
    text: String,
    request_tokens: Vec<String>,
    policy_tokens: Vec<String>,
    role_definition: bool,
}

impl CompiledModel {
    pub async fn built_in() -> Result<Self, AuthzError> {
        Self::compile(BUILT_IN_MODEL).await
    }

    /// Normalize `text` and check that casbin accepts it.
    pub async fn compile(text: &str) -> Result<Self, AuthzError> {
        let compiled = normalize(text)?;
        compiled.to_casbin().await?;
        Ok(compiled)
    }

    /// A fresh casbin model for one enforcer.
    pub async fn to_casbin(&self) -> Result<DefaultModel, AuthzError> {
        DefaultModel::from_str(&self.text)
            .await
            .map_err(|e| AuthzError::Configuration(format!("invalid model: {}", e)))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the model declares a `g` role relation.
    pub fn has_role_definition(&self) -> bool {
        self.role_definition
    }

    pub fn request_tokens(&self) -> &[String] {
        &self.request_tokens
    }

    pub fn policy_tokens(&self) -> &[String] {
        &self.policy_tokens
    }

    pub fn policy_field_index(&self, name: &str) -> Option<usize> {
        self.policy_tokens.iter().position(|t| t == name)
    }

    /// A request that a policy row would answer: each request field takes the
    /// value of the same-named policy field, or empty.
    pub(crate) fn request_for(&self, rule: &[String]) -> Vec<String> {
        self.request_tokens
            .iter()
            .map(|token| {
                self.policy_field_index(token)
                    .and_then(|i| rule.get(i).cloned())
                    .unwrap_or_default()
            })
            .collect()
    }
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim())
        .map(|t| if t == "\"\"" { "" } else { t })
        .map(str::to_string)
        .collect()
}

fn pad_policy_definition(mut tokens: Vec<String>) -> Result<Vec<String>, AuthzError> {
    if tokens.len() > RULE_WIDTH {
        return Err(AuthzError::Configuration(format!(
            "policy definition has {} fields, at most {} are supported",
            tokens.len(),
            RULE_WIDTH
        )));
    }

    if tokens.len() == RULE_WIDTH {
        if tokens[RULE_WIDTH - 1] != PERMISSION_ID_FIELD {
            return Err(AuthzError::Configuration(format!(
                "the last policy field must be `{}`, found `{}`",
                PERMISSION_ID_FIELD,
                tokens[RULE_WIDTH - 1]
            )));
        }
    } else {
        tokens.resize(RULE_WIDTH - 1, String::new());
        tokens.push(PERMISSION_ID_FIELD.to_string());
    }

    for (i, token) in tokens.iter_mut().enumerate() {
        if token.is_empty() {
            *token = format!("v{}", i);
        }
    }
    Ok(tokens)
}

fn normalize(text: &str) -> Result<CompiledModel, AuthzError> {
    let mut section = String::new();
    let mut lines = Vec::new();
    let mut request_tokens = None;
    let mut policy_tokens = None;
    let mut role_definition = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
            lines.push(line.to_string());
            continue;
        }
        if line.starts_with('#') {
            lines.push(raw.to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            lines.push(raw.to_string());
            continue;
        };

        match (section.as_str(), key.trim()) {
            ("request_definition", "r") => {
                request_tokens = Some(split_tokens(value));
            }
            ("policy_definition", "p") => {
                let padded = pad_policy_definition(split_tokens(value))?;
                lines.push(format!("p = {}", padded.join(", ")));
                policy_tokens = Some(padded);
                continue;
            }
            ("role_definition", "g") => role_definition = true,
            _ => {}
        }
        lines.push(raw.to_string());
    }

    let request_tokens = request_tokens.ok_or_else(|| {
        AuthzError::Configuration("model has no request definition `r`".to_string())
    })?;
    let policy_tokens = policy_tokens.ok_or_else(|| {
        AuthzError::Configuration("model has no policy definition `p`".to_string())
    })?;

    Ok(CompiledModel {
        text: lines.join("\n"),
        request_tokens,
        policy_tokens,
        role_definition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_MODEL: &str = r#"[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
"#;

    #[tokio::test]
    async fn test_built_in_model_compiles() {
        let model = CompiledModel::built_in().await.expect("Failed to compile built-in");

        assert!(model.has_role_definition());
        assert_eq!(model.request_tokens(), &["sub", "obj", "act"]);
        assert_eq!(
            model.policy_tokens(),
            &["sub", "obj", "act", "eft", "v4", "permissionId"]
        );
    }

    #[tokio::test]
    async fn test_short_policy_definition_is_padded() {
        let model = CompiledModel::compile(DOMAIN_MODEL)
            .await
            .expect("Failed to compile");

        assert_eq!(
            model.policy_tokens(),
            &["sub", "dom", "obj", "act", "v4", "permissionId"]
        );
        assert!(model.text().contains("p = sub, dom, obj, act, v4, permissionId"));
        assert_eq!(model.policy_field_index("obj"), Some(2));
    }

    #[tokio::test]
    async fn test_too_many_policy_fields_rejected() {
        let text = BUILT_IN_MODEL.replace(
            "p = sub, obj, act, eft, \"\", permissionId",
            "p = sub, obj, act, eft, a, b, permissionId",
        );

        let err = CompiledModel::compile(&text).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_sixth_field_must_be_permission_id() {
        let text = BUILT_IN_MODEL.replace(
            "p = sub, obj, act, eft, \"\", permissionId",
            "p = sub, obj, act, eft, a, owner",
        );

        let err = CompiledModel::compile(&text).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_model_without_role_definition() {
        let text = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;
        let model = CompiledModel::compile(text).await.expect("Failed to compile");
        assert!(!model.has_role_definition());
    }

    #[test]
    fn test_request_for_maps_by_field_name() {
        let model = normalize(DOMAIN_MODEL).expect("Failed to normalize");
        let rule: Vec<String> = ["alice", "tenant1", "data1", "read", "allow", "org/p"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            model.request_for(&rule),
            vec!["alice", "tenant1", "data1", "read"]
        );
    }
}
