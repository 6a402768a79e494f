use miette::Diagnostic;
use thiserror::Error;

use crate::authz::errors::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(gatekeeper::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(gatekeeper::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(gatekeeper::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(gatekeeper::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),

    #[error("HTTP error: {0}")]
    #[diagnostic(code(gatekeeper::http))]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    #[diagnostic(code(gatekeeper::not_found))]
    NotFound(String),

    #[error("Bad request: {0}")]
    #[diagnostic(code(gatekeeper::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(gatekeeper::other))]
    Other(String),
}

impl CoreError {
    /// True when the failure comes from a broken model, adapter or table
    /// configuration rather than from the data being processed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::Authz(e) if e.is_configuration())
    }
}
