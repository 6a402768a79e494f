use serde::{Deserialize, Serialize};

/// Number of value columns in a policy row (`v0..v5`).
pub const RULE_WIDTH: usize = 6;

/// A stored policy row, and the shape of an authorization request.
///
/// As a request, `v0..v3` carry the request values and `id` names the
/// permission (`owner/name`) whose enforcer evaluates it. `v3` is only sent
/// when non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionRule {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
    pub id: String,
}

impl PermissionRule {
    /// Request against permission `id` with three values.
    pub fn request(id: &str, v0: &str, v1: &str, v2: &str) -> Self {
        Self {
            ptype: "p".to_string(),
            v0: v0.to_string(),
            v1: v1.to_string(),
            v2: v2.to_string(),
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Same request with a fourth value, e.g. a domain-aware model.
    pub fn with_v3(mut self, v3: &str) -> Self {
        self.v3 = v3.to_string();
        self
    }

    pub(crate) fn request_values(&self) -> Vec<String> {
        let mut values = vec![self.v0.clone(), self.v1.clone(), self.v2.clone()];
        if !self.v3.is_empty() {
            values.push(self.v3.clone());
        }
        values
    }
}

/// Which enforcer section a policy type belongs to: `p`, `p2` → `p`; `g`, `g2` → `g`.
pub(crate) fn section_of(ptype: &str) -> Option<&'static str> {
    match ptype.chars().next() {
        Some('p') => Some("p"),
        Some('g') => Some("g"),
        _ => None,
    }
}

/// Pad a rule with empty values to the full row width.
pub(crate) fn pad_rule(rule: &[String]) -> Vec<String> {
    let mut padded: Vec<String> = rule.iter().take(RULE_WIDTH).cloned().collect();
    padded.resize(RULE_WIDTH, String::new());
    padded
}

/// Drop trailing empty values, the inverse of [`pad_rule`] for loaded rows.
pub(crate) fn trim_rule(mut rule: Vec<String>) -> Vec<String> {
    while rule.last().is_some_and(|v| v.is_empty()) {
        rule.pop();
    }
    rule
}
