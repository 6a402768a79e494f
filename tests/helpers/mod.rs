#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod mock_sender;

#[allow(unused_imports)]
pub use builders::{login_record, PermissionBuilder, RoleBuilder, WebhookBuilder};
pub use db::TestDb;
#[allow(unused_imports)]
pub use mock_sender::RecordingSender;
