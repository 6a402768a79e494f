use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::authz::errors::AuthzError;
use crate::errors::CoreError;
use crate::jobs;
use crate::object::webhook_event::{self, WebhookEventFilter};
use crate::object::{webhook, Record, Webhook, WebhookEvent, WebhookEventStatus};
use crate::settings;
use crate::webhook::sender::WebhookSender;

pub const DELIVERY_JOB: &str = "webhook_delivery";

/// Upper bound for a single backoff step, in seconds.
pub const MAX_RETRY_DELAY_SECS: i64 = 3600;

const MAX_RESPONSE_CHARS: usize = 300;

/// Delay before retry number `attempt` (1-based).
pub fn retry_delay_secs(attempt: i32, base_secs: i64, exponential: bool) -> i64 {
    if !exponential {
        return base_secs;
    }
    let exponent = attempt.saturating_sub(1).clamp(0, 30) as u32;
    base_secs
        .saturating_mul(1i64 << exponent)
        .min(MAX_RETRY_DELAY_SECS)
}

/// Timestamp at which retry number `attempt` becomes due.
pub fn calculate_next_retry_time(attempt: i32, base_secs: i64, exponential: bool) -> String {
    let delay = retry_delay_secs(attempt, base_secs, exponential);
    (Utc::now() + ChronoDuration::seconds(delay)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Polls due webhook events and delivers them one at a time.
///
/// Cloning yields another handle to the same worker.
#[derive(Clone)]
pub struct WebhookWorker {
    db: DatabaseConnection,
    sender: Arc<dyn WebhookSender>,
    cfg: settings::Webhook,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl WebhookWorker {
    pub fn new(db: DatabaseConnection, sender: Arc<dyn WebhookSender>, cfg: settings::Webhook) -> Self {
        Self {
            db,
            sender,
            cfg,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the polling loop. Returns `None` if it is already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Webhook worker already running");
            return None;
        }

        let worker = self.clone();
        Some(tokio::spawn(async move {
            let period = worker.cfg.poll_interval();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = period.as_secs(), "Webhook worker started");

            loop {
                tokio::select! {
                    _ = worker.shutdown.notified() => {
                        tracing::info!("Webhook worker received stop signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = jobs::trigger_job_manually(&worker, DELIVERY_JOB).await {
                            tracing::error!(error = %e, "Webhook delivery tick failed");
                        }
                    }
                }
            }

            worker.running.store(false, Ordering::SeqCst);
        }))
    }

    /// Ask the loop to exit after the current tick. A delivery in flight completes.
    pub fn stop(&self) {
        if self.is_running() {
            self.shutdown.notify_one();
        }
    }

    /// Deliver one batch of due events. Returns how many were processed.
    pub async fn process_webhook_events(&self) -> Result<u64, CoreError> {
        let events = webhook_event::get_pending_webhook_events(&self.db, self.cfg.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = events.len(), "Processing webhook events");

        let mut processed = 0;
        for mut event in events {
            match self.deliver_webhook_event(&mut event).await {
                Ok(_) => processed += 1,
                Err(e) => tracing::error!(event = %event.id(), error = %e, "Failed to process webhook event"),
            }
        }
        Ok(processed)
    }

    async fn find_webhook(&self, id: &str) -> Result<Option<Webhook>, CoreError> {
        match webhook::get_webhook(&self.db, id).await {
            Err(CoreError::Authz(AuthzError::InvalidId(_))) => Ok(None),
            other => other,
        }
    }

    fn max_retries(&self, webhook: &Webhook, event: &WebhookEvent) -> i32 {
        if webhook.max_retries > 0 {
            webhook.max_retries
        } else if event.max_retries > 0 {
            event.max_retries
        } else {
            self.cfg.default_max_retries
        }
    }

    fn retry_base_secs(&self, webhook: &Webhook) -> i64 {
        if webhook.retry_interval > 0 {
            i64::from(webhook.retry_interval)
        } else {
            self.cfg.default_retry_interval_secs
        }
    }

    /// Attempt one delivery and persist the resulting state.
    ///
    /// Returns `true` when the endpoint answered 2xx. Events of a disabled
    /// webhook are left untouched.
    pub async fn deliver_webhook_event(&self, event: &mut WebhookEvent) -> Result<bool, CoreError> {
        let Some(webhook) = self.find_webhook(&event.webhook_name).await? else {
            tracing::warn!(event = %event.id(), webhook = %event.webhook_name, "Webhook not found");
            webhook_event::update_webhook_event_status(
                &self.db,
                event,
                WebhookEventStatus::Failed,
                0,
                "",
                Some("Webhook not found"),
            )
            .await?;
            return Ok(false);
        };

        if !webhook.is_enabled {
            tracing::debug!(event = %event.id(), webhook = %webhook.id(), "Webhook disabled, skipping");
            return Ok(false);
        }

        let record: Record = match serde_json::from_str(&event.payload) {
            Ok(r) => r,
            Err(e) => {
                let message = format!("Failed to parse payload: {}", e);
                webhook_event::update_webhook_event_status(
                    &self.db,
                    event,
                    WebhookEventStatus::Failed,
                    0,
                    "",
                    Some(&message),
                )
                .await?;
                return Ok(false);
            }
        };

        let extended_user: Option<Value> = if event.extended_user.is_empty() {
            None
        } else {
            match serde_json::from_str(&event.extended_user) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(event = %event.id(), error = %e, "Ignoring unparsable extended user");
                    None
                }
            }
        };

        event.attempt_count += 1;
        let outcome = self.sender.send(&webhook, &record, extended_user.as_ref()).await;
        let response = truncate_chars(&outcome.body, MAX_RESPONSE_CHARS);

        if outcome.is_success() {
            event.next_retry_time.clear();
            webhook_event::update_webhook_event_status(
                &self.db,
                event,
                WebhookEventStatus::Success,
                outcome.status_code,
                &response,
                None,
            )
            .await?;
            tracing::debug!(event = %event.id(), status = outcome.status_code, "Webhook delivered");
            return Ok(true);
        }

        let error = outcome
            .error
            .clone()
            .unwrap_or_else(|| format!("unexpected status code {}", outcome.status_code));

        let status = if event.attempt_count >= self.max_retries(&webhook, event) {
            event.next_retry_time.clear();
            WebhookEventStatus::Failed
        } else {
            event.next_retry_time = calculate_next_retry_time(
                event.attempt_count,
                self.retry_base_secs(&webhook),
                webhook.use_exponential_backoff,
            );
            WebhookEventStatus::Retrying
        };

        tracing::warn!(
            event = %event.id(),
            attempt = event.attempt_count,
            status = %status,
            error = %error,
            "Webhook delivery failed"
        );
        webhook_event::update_webhook_event_status(
            &self.db,
            event,
            status,
            outcome.status_code,
            &response,
            Some(&error),
        )
        .await?;
        Ok(false)
    }

    /// Reset an event to a fresh pending state and deliver it now.
    pub async fn replay_webhook_event(&self, id: &str) -> Result<bool, CoreError> {
        let mut event = webhook_event::get_webhook_event(&self.db, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("webhook event {}", id)))?;
        self.replay(&mut event).await
    }

    async fn replay(&self, event: &mut WebhookEvent) -> Result<bool, CoreError> {
        event.status = WebhookEventStatus::Pending;
        event.attempt_count = 0;
        event.next_retry_time.clear();
        event.last_error.clear();

        let id = event.id();
        if !webhook_event::update_webhook_event(&self.db, &id, event).await? {
            return Err(CoreError::NotFound(format!("webhook event {}", id)));
        }
        self.deliver_webhook_event(event).await
    }

    /// Replay every matching event. Returns how many were reset and attempted.
    pub async fn replay_webhook_events(
        &self,
        owner: &str,
        organization: &str,
        webhook_name: &str,
        status: Option<WebhookEventStatus>,
    ) -> Result<u64, CoreError> {
        let filter = WebhookEventFilter {
            owner: owner.to_string(),
            organization: organization.to_string(),
            webhook_name: webhook_name.to_string(),
            status,
            ..Default::default()
        };

        let mut replayed = 0;
        for mut event in webhook_event::get_webhook_events(&self.db, &filter).await? {
            match self.replay(&mut event).await {
                Ok(_) => replayed += 1,
                Err(e) => tracing::error!(event = %event.id(), error = %e, "Failed to replay webhook event"),
            }
        }
        tracing::info!(count = replayed, "Replayed webhook events");
        Ok(replayed)
    }
}
