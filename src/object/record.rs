use serde::{Deserialize, Serialize};

/// An audit record of an action taken in the platform.
///
/// Records are the payload of webhook events: the event stores the record as
/// JSON and the delivery worker posts it back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub owner: String,
    pub name: String,
    pub created_time: String,
    pub organization: String,
    pub client_ip: String,
    pub user: String,
    pub method: String,
    pub request_uri: String,
    pub action: String,
    pub language: String,
    pub object: String,
    pub response: String,
    pub status_code: i32,
    pub is_triggered: bool,
}
