use std::sync::Mutex;

use async_trait::async_trait;
use gatekeeper::object::{Record, Webhook};
use gatekeeper::webhook::{DeliveryOutcome, WebhookSender};
use serde_json::Value;

/// One captured call to the sender
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub webhook: String,
    pub record: Record,
    pub extended_user: Option<Value>,
}

/// Sender that records every call and answers with a fixed status code
pub struct RecordingSender {
    status_code: i32,
    sent: Mutex<Vec<SentRequest>>,
}

impl RecordingSender {
    pub fn new(status_code: i32) -> Self {
        Self {
            status_code,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().expect("Sender lock poisoned").clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, webhook: &Webhook, record: &Record, extended_user: Option<&Value>) -> DeliveryOutcome {
        self.sent.lock().expect("Sender lock poisoned").push(SentRequest {
            webhook: webhook.id(),
            record: record.clone(),
            extended_user: extended_user.cloned(),
        });
        DeliveryOutcome {
            status_code: self.status_code,
            body: format!("status {}", self.status_code),
            error: None,
        }
    }
}
