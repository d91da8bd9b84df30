//! Health alerts.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

/// Something an operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Alert {
    /// Consecutive failures reached the alert threshold.
    Down {
        name: String,
        url: String,
        num_retries: u32,
        error: Option<String>,
    },
    /// An errored microservice registered again.
    Restored { name: String, url: String },
    /// Retries exhausted; the microservice was deleted.
    Removed {
        name: String,
        url: String,
        num_retries: u32,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert. Delivery failures are logged, never returned.
    async fn notify(&self, alert: &Alert);
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) {
        match alert {
            Alert::Down {
                name,
                url,
                num_retries,
                error,
            } => tracing::error!(
                microservice = %name,
                url = %url,
                num_retries,
                error = error.as_deref().unwrap_or(""),
                "Microservice down"
            ),
            Alert::Restored { name, url } => {
                tracing::info!(microservice = %name, url = %url, "Microservice restored")
            }
            Alert::Removed {
                name,
                url,
                num_retries,
            } => tracing::warn!(
                microservice = %name,
                url = %url,
                num_retries,
                "Microservice removed after exhausting retries"
            ),
        }
    }
}

/// Posts alerts as JSON to a webhook, and logs them.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) {
        LogNotifier.notify(alert).await;
        match self.client.post(&self.url).json(alert).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Alert webhook rejected alert")
            }
            Err(e) => tracing::warn!(error = %e, "Alert webhook unreachable"),
        }
    }
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}
