//! Permission enforcement on top of casbin.
//!
//! Permissions and roles are the source of truth; the policy rows in the
//! adapter tables are derived from them by [`sync::PolicySynchronizer`] and
//! read back by [`engine::AuthzEngine`] through per-permission enforcers.

pub mod adapter;
pub mod engine;
pub mod errors;
pub mod factory;
pub mod model;
pub mod sync;
pub mod types;
pub mod user_group;

pub use engine::AuthzEngine;
pub use errors::AuthzError;
pub use factory::{EnforcerFactory, PermissionEnforcer};
pub use model::CompiledModel;
pub use sync::{get_policies, PolicySynchronizer};
pub use types::PermissionRule;
pub use user_group::UserGroupEnforcer;
