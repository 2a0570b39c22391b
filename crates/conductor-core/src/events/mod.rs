//! Fire-and-forget side effects: system alerts, webhook notifications and
//! analytics events.
//!
//! Producers push onto a bounded channel and never wait. A single consumer
//! task fans each event out to the registered sinks. When the channel is
//! full the event is dropped with a warning, so a slow sink cannot stall a
//! workflow or an agent run.

mod sinks;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ConductorError;

pub use sinks::{MemorySink, TracingSink, WebhookNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl SystemAlert {
    pub fn new(alert_type: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            severity,
            message: message.into(),
            context: Value::Null,
            metadata: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub user_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Alert(SystemAlert),
    Webhook(Value),
    Analytics(AnalyticsEvent),
}

/// Destination for dispatched events. Every method defaults to a no-op so a
/// sink only implements what it cares about.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn log_system_alert(&self, _alert: &SystemAlert) -> Result<(), ConductorError> {
        Ok(())
    }

    async fn send_webhook_alert(&self, _payload: &Value) -> Result<(), ConductorError> {
        Ok(())
    }

    async fn log_event(&self, _event: &AnalyticsEvent) -> Result<(), ConductorError> {
        Ok(())
    }
}

enum Envelope {
    Event(DispatchEvent),
    Flush(oneshot::Sender<()>),
}

/// Cheap-to-clone producer handle.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<Envelope>,
}

impl EventDispatcher {
    /// Start the consumer task. Must be called inside a Tokio runtime.
    pub fn spawn(capacity: usize, sinks: Vec<Arc<dyn EventSink>>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Event(event) => deliver(&sinks, &event).await,
                    Envelope::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            tracing::debug!("[Events] Dispatcher channel closed");
        });

        (Self { tx }, handle)
    }

    pub fn dispatch(&self, event: DispatchEvent) {
        match self.tx.try_send(Envelope::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Envelope::Event(event))) => {
                tracing::warn!("[Events] Channel full, dropping {}", describe(&event));
            }
            Err(_) => {
                tracing::debug!("[Events] Dispatcher stopped, event discarded");
            }
        }
    }

    pub fn alert(&self, alert: SystemAlert) {
        self.dispatch(DispatchEvent::Alert(alert));
    }

    pub fn webhook(&self, payload: Value) {
        self.dispatch(DispatchEvent::Webhook(payload));
    }

    pub fn analytics(&self, user_id: &str, event_type: &str, payload: Value) {
        self.dispatch(DispatchEvent::Analytics(AnalyticsEvent {
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        }));
    }

    /// Wait until every event queued before this call has been delivered.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Envelope::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

fn describe(event: &DispatchEvent) -> String {
    match event {
        DispatchEvent::Alert(a) => format!("alert '{}'", a.alert_type),
        DispatchEvent::Webhook(_) => "webhook".to_string(),
        DispatchEvent::Analytics(e) => format!("analytics '{}'", e.event_type),
    }
}

async fn deliver(sinks: &[Arc<dyn EventSink>], event: &DispatchEvent) {
    for sink in sinks {
        let outcome = match event {
            DispatchEvent::Alert(alert) => sink.log_system_alert(alert).await,
            DispatchEvent::Webhook(payload) => sink.send_webhook_alert(payload).await,
            DispatchEvent::Analytics(e) => sink.log_event(e).await,
        };
        if let Err(e) = outcome {
            tracing::warn!("[Events] Sink failed on {}: {}", describe(event), e);
        }
    }
}
