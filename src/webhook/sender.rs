use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::errors::CoreError;
use crate::object::{Record, Webhook};

/// What came back from one delivery attempt.
///
/// `status_code` is 0 when no response was received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status_code: i32,
    pub body: String,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, webhook: &Webhook, record: &Record, extended_user: Option<&Value>) -> DeliveryOutcome;
}

/// The JSON document posted for `record`.
pub fn build_body(webhook: &Webhook, record: &Record, extended_user: Option<&Value>) -> Result<Value, CoreError> {
    let mut body = serde_json::to_value(record)?;
    if webhook.is_user_extended {
        if let (Some(user), Value::Object(map)) = (extended_user, &mut body) {
            map.insert("extendedUser".to_string(), user.clone());
        }
    }
    Ok(body)
}

pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn headers(webhook: &Webhook) -> Result<HeaderMap, String> {
        let content_type = if webhook.content_type.is_empty() {
            "application/json"
        } else {
            webhook.content_type.as_str()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(|e| format!("invalid content type: {}", e))?,
        );
        for header in &webhook.headers {
            if header.name.is_empty() {
                continue;
            }
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| format!("invalid header `{}`: {}", header.name, e))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| format!("invalid value for header `{}`: {}", header.name, e))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, webhook: &Webhook, record: &Record, extended_user: Option<&Value>) -> DeliveryOutcome {
        let method = if webhook.method.is_empty() {
            Method::POST
        } else {
            match Method::from_bytes(webhook.method.to_uppercase().as_bytes()) {
                Ok(m) => m,
                Err(e) => return DeliveryOutcome::failed(format!("invalid method: {}", e)),
            }
        };
        let headers = match Self::headers(webhook) {
            Ok(h) => h,
            Err(e) => return DeliveryOutcome::failed(e),
        };
        let body = match build_body(webhook, record, extended_user).and_then(|b| serde_json::to_vec(&b).map_err(CoreError::from)) {
            Ok(b) => b,
            Err(e) => return DeliveryOutcome::failed(e.to_string()),
        };

        let response = self
            .client
            .request(method, &webhook.url)
            .headers(headers)
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status_code = i32::from(resp.status().as_u16());
                match resp.text().await {
                    Ok(body) => DeliveryOutcome {
                        status_code,
                        body,
                        error: None,
                    },
                    Err(e) => DeliveryOutcome {
                        status_code,
                        body: String::new(),
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => DeliveryOutcome::failed(e.to_string()),
        }
    }
}
