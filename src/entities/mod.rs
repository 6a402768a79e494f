pub mod job_execution;
pub mod permission;
pub mod policy_adapter;
pub mod policy_model;
pub mod role;
pub mod webhook;
pub mod webhook_event;

pub use job_execution::Entity as JobExecution;
pub use permission::Entity as Permission;
pub use policy_adapter::Entity as PolicyAdapter;
pub use policy_model::Entity as PolicyModel;
pub use role::Entity as Role;
pub use webhook::Entity as Webhook;
pub use webhook_event::Entity as WebhookEvent;
