use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{AnalyticsEvent, EventSink, Severity, SystemAlert};
use crate::error::ConductorError;

/// Writes alerts and analytics to the `tracing` subscriber.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn log_system_alert(&self, alert: &SystemAlert) -> Result<(), ConductorError> {
        match alert.severity {
            Severity::Low | Severity::Medium => tracing::info!(
                "[Alert:{}] {} ({:?})",
                alert.alert_type,
                alert.message,
                alert.severity
            ),
            Severity::High => tracing::warn!("[Alert:{}] {}", alert.alert_type, alert.message),
            Severity::Critical => {
                tracing::error!("[Alert:{}] {}", alert.alert_type, alert.message)
            }
        }
        Ok(())
    }

    async fn log_event(&self, event: &AnalyticsEvent) -> Result<(), ConductorError> {
        tracing::debug!(
            "[Analytics] {} user={} payload={}",
            event.event_type,
            event.user_id,
            crate::truncate(&event.payload.to_string(), 200)
        );
        Ok(())
    }
}

/// POSTs webhook payloads as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, ConductorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl EventSink for WebhookNotifier {
    async fn send_webhook_alert(&self, payload: &Value) -> Result<(), ConductorError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(ConductorError::Provider(format!(
                "Webhook {} returned {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Keeps everything it receives. Handy for inspection and tests.
#[derive(Default)]
pub struct MemorySink {
    alerts: Mutex<Vec<SystemAlert>>,
    webhooks: Mutex<Vec<Value>>,
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<SystemAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn webhooks(&self) -> Vec<Value> {
        self.webhooks.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn log_system_alert(&self, alert: &SystemAlert) -> Result<(), ConductorError> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
        Ok(())
    }

    async fn send_webhook_alert(&self, payload: &Value) -> Result<(), ConductorError> {
        if let Ok(mut webhooks) = self.webhooks.lock() {
            webhooks.push(payload.clone());
        }
        Ok(())
    }

    async fn log_event(&self, event: &AnalyticsEvent) -> Result<(), ConductorError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
