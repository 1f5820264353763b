//! Stakeholder notification sinks

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use crate::anomaly::NotificationMessage;
use crate::error::NotificationError;
use crate::models::Severity;

/// Destination for emergency alerts
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError>;
}

/// Posts alerts as JSON to a webhook (chat, pager, pub/sub bridge)
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes alerts to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        if message.severity >= Severity::High {
            warn!(subject = %message.subject, body = %message.body, "Stakeholder alert");
        } else {
            info!(subject = %message.subject, body = %message.body, "Stakeholder alert");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn message() -> NotificationMessage {
        NotificationMessage {
            subject: "[HIGH] Cost emergency".to_string(),
            body: "Projected monthly spend observed 950.00".to_string(),
            severity: Severity::High,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_webhook_delivery() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "subject": "[HIGH] Cost emergency"
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), Duration::from_secs(5)).unwrap();
        notifier.send(&message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_failure_surfaces_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/hook").with_status(500).create_async().await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url()), Duration::from_secs(5)).unwrap();
        let err = notifier.send(&message()).await.unwrap_err();
        assert!(err.0.contains("500"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.send(&message()).await.is_ok());
    }
}
