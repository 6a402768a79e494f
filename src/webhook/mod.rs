//! Outbound webhook delivery with retries.

pub mod sender;
pub mod worker;

pub use sender::{DeliveryOutcome, HttpWebhookSender, WebhookSender};
pub use worker::WebhookWorker;
