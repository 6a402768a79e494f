//! Record stores for the declarative authorization objects and webhooks.
//!
//! Every function takes the database handle explicitly and returns domain
//! structs rather than entity models; list-valued fields are stored as JSON
//! text and decoded here.

pub mod permission;
pub mod policy_adapter;
pub mod policy_model;
pub mod record;
pub mod role;
pub mod webhook;
pub mod webhook_event;

pub use permission::Permission;
pub use policy_adapter::PolicyAdapter;
pub use policy_model::PolicyModel;
pub use record::Record;
pub use role::Role;
pub use webhook::{Webhook, WebhookHeader};
pub use webhook_event::{WebhookEvent, WebhookEventFilter, WebhookEventStatus};

use sea_orm::sea_query::{IntoIden, OnConflict};

use crate::authz::errors::AuthzError;
use crate::errors::CoreError;
use crate::storage;

pub(crate) fn parse_id(id: &str) -> Result<(&str, &str), CoreError> {
    storage::split_id(id).ok_or_else(|| AuthzError::InvalidId(id.to_string()).into())
}

/// Resolve a reference that is either a bare name under `owner` or a full id.
pub(crate) fn scoped_id(owner: &str, reference: &str) -> String {
    if reference.contains('/') {
        reference.to_string()
    } else {
        storage::get_id(owner, reference)
    }
}

/// `ON CONFLICT (owner, name) DO NOTHING`: a duplicate insert surfaces as
/// `DbErr::RecordNotInserted` rather than a constraint violation.
pub(crate) fn owner_name_conflict<C: IntoIden>(owner: C, name: C) -> OnConflict {
    OnConflict::columns([owner, name]).do_nothing().to_owned()
}
