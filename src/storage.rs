use crate::errors::CoreError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use sea_orm::{Database, DatabaseConnection};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, CoreError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// Current UTC time as RFC 3339 with second precision, e.g. `2025-03-01T10:00:00Z`.
///
/// All stored timestamps use this exact shape so that string comparison
/// orders them chronologically.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn random_id() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

pub fn get_id(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name)
}

/// Split an `owner/name` id. Only the first `/` separates; names may not be empty.
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    match id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Some((owner, name)),
        _ => None,
    }
}

/// Decode a JSON list column. Empty text reads as an empty list.
pub fn from_json_list<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, CoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

pub fn to_json_list<T: Serialize>(items: &[T]) -> Result<String, CoreError> {
    Ok(serde_json::to_string(items)?)
}
