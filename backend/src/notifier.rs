use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use shared::NotificationEvent;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Endpoint answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// Sink for detection events. Implementations swallow their own failures.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: NotificationEvent);
}

#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub async fn try_notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, event: NotificationEvent) {
        match self.try_notify(&event).await {
            Ok(()) => info!("Notified {} about {}", self.endpoint, event.url),
            Err(e) => error!("Failed to notify {} about {}: {}", self.endpoint, event.url, e),
        }
    }
}
