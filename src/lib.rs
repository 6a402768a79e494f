//! Gatekeeper - permission enforcement and webhook delivery core
//!
//! Permissions, roles and policy models are stored as records; the casbin
//! policy rows that enforce them are derived and kept in sync here. Audit
//! records fan out to subscribed webhooks through a retrying delivery worker.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod object;
pub mod settings;
pub mod storage;
pub mod webhook;
