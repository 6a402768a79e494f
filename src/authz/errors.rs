use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Configuration fault: {0}")]
    #[diagnostic(
        code(gatekeeper::authz::configuration),
        help("Check the permission's model text and adapter table name; these faults are never retried")
    )]
    Configuration(String),

    #[error("Policy validation failed: {0}")]
    #[diagnostic(
        code(gatekeeper::authz::validation),
        help("The permission was not changed. Fix the users, roles, resources or actions so they match the model's policy definition")
    )]
    Validation(String),

    #[error("Permission `{0}` does not exist")]
    #[diagnostic(
        code(gatekeeper::authz::permission_not_found),
        help("Requests against an unknown permission must be denied")
    )]
    PermissionNotFound(String),

    #[error("Batch mixes permissions `{first}` and `{other}`")]
    #[diagnostic(
        code(gatekeeper::authz::mixed_batch),
        help("Split the batch so every rule carries the same permission id")
    )]
    MixedPermissionBatch { first: String, other: String },

    #[error("Invalid id `{0}`")]
    #[diagnostic(
        code(gatekeeper::authz::invalid_id),
        help("Ids have the form `owner/name`")
    )]
    InvalidId(String),

    #[error("Policy store error: {0}")]
    #[diagnostic(code(gatekeeper::authz::store))]
    Store(#[from] sea_orm::DbErr),

    #[error("Enforcer error: {0}")]
    #[diagnostic(code(gatekeeper::authz::enforcer))]
    Enforcer(String),
}

impl AuthzError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AuthzError::Configuration(_))
    }
}

impl From<casbin::Error> for AuthzError {
    fn from(value: casbin::Error) -> Self {
        match value {
            casbin::Error::ModelError(e) => AuthzError::Configuration(e.to_string()),
            other => AuthzError::Enforcer(other.to_string()),
        }
    }
}
