use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use shared::NotificationEvent;
use tokio::time::timeout;

use crate::notifier::Notifier;
use crate::storage::publisher::{ArtifactPublisher, PublishError, annotated_key, original_key};
use crate::storage::temp_store::{ScratchFile, TempStore};

/// One outstanding publish: both scratch files belong to the job from here on.
#[derive(Debug)]
pub struct PublishJob {
    pub id: String,
    pub confidence: u8,
    pub original: ScratchFile,
    pub annotated: ScratchFile,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobOutcome {
    pub original_url: Option<String>,
    pub annotated_url: Option<String>,
    /// The notifier returned before its deadline. Delivery failures are
    /// logged by the notifier itself.
    pub notify_attempted: bool,
}

/// Shared collaborators for running jobs.
pub struct JobRunner {
    publisher: Arc<dyn ArtifactPublisher>,
    notifier: Arc<dyn Notifier>,
    temp_store: TempStore,
    message: String,
    publish_timeout: Duration,
    notify_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        publisher: Arc<dyn ArtifactPublisher>,
        notifier: Arc<dyn Notifier>,
        temp_store: TempStore,
        message: String,
        publish_timeout: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            notifier,
            temp_store,
            message,
            publish_timeout,
            notify_timeout,
        }
    }

    pub fn temp_store(&self) -> &TempStore {
        &self.temp_store
    }

    /// Publishes, notifies, then releases both scratch files whatever happened.
    pub async fn run(self: Arc<Self>, job: PublishJob) -> JobOutcome {
        let PublishJob {
            id,
            confidence,
            original,
            annotated,
        } = job;
        info!("Job {} started", id);

        let original = Arc::new(original);
        let annotated = Arc::new(annotated);

        // Separate task so a panic in a collaborator cannot skip cleanup.
        let body = tokio::spawn({
            let runner = self.clone();
            let id = id.clone();
            let original = original.clone();
            let annotated = annotated.clone();
            async move {
                runner
                    .publish_and_notify(&id, confidence, &original, &annotated)
                    .await
            }
        });

        let outcome = match body.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Job {} aborted: {}", id, e);
                JobOutcome::default()
            }
        };

        self.temp_store.release(&original).await;
        self.temp_store.release(&annotated).await;
        info!(
            "Job {} finished (original: {}, annotated: {}, notify attempted: {})",
            id,
            outcome.original_url.as_deref().unwrap_or("-"),
            outcome.annotated_url.as_deref().unwrap_or("-"),
            outcome.notify_attempted
        );
        outcome
    }

    async fn publish_and_notify(
        &self,
        id: &str,
        confidence: u8,
        original: &ScratchFile,
        annotated: &ScratchFile,
    ) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        let original_url = match self.publish(original, &original_key(id)).await {
            Ok(url) => url,
            Err(e) => {
                error!("Job {}: failed to publish original: {}", id, e);
                return outcome;
            }
        };
        outcome.original_url = Some(original_url.clone());

        match self.publish(annotated, &annotated_key(confidence, id)).await {
            Ok(url) => outcome.annotated_url = Some(url),
            Err(e) => error!("Job {}: failed to publish annotated image: {}", id, e),
        }

        let event = NotificationEvent {
            message: self.message.clone(),
            url: original_url,
        };
        if timeout(self.notify_timeout, self.notifier.notify(event))
            .await
            .is_err()
        {
            warn!(
                "Job {}: notification timed out after {:?}",
                id, self.notify_timeout
            );
        } else {
            outcome.notify_attempted = true;
        }

        outcome
    }

    async fn publish(&self, file: &ScratchFile, key: &str) -> Result<String, PublishError> {
        timeout(self.publish_timeout, self.publisher.publish(file, key))
            .await
            .map_err(|_| PublishError::Timeout(self.publish_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoPublisher;

    #[async_trait]
    impl ArtifactPublisher for EchoPublisher {
        async fn publish(&self, _file: &ScratchFile, key: &str) -> Result<String, PublishError> {
            Ok(format!("https://bucket.example/{}", key))
        }
    }

    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn notify(&self, _event: NotificationEvent) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    struct QuietNotifier;

    #[async_trait]
    impl Notifier for QuietNotifier {
        async fn notify(&self, _event: NotificationEvent) {}
    }

    async fn run_once(notifier: Arc<dyn Notifier>) -> (JobOutcome, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path());
        let runner = Arc::new(JobRunner::new(
            Arc::new(EchoPublisher),
            notifier,
            store.clone(),
            "Bottle detected".to_string(),
            Duration::from_secs(5),
            Duration::from_millis(50),
        ));
        let job = PublishJob {
            id: "req-1".to_string(),
            confidence: 91,
            original: store.stage("req-1", b"original", "a.png").await.unwrap(),
            annotated: store.stage("req-1", b"annotated", "a.png").await.unwrap(),
        };
        (runner.run(job).await, dir)
    }

    #[tokio::test]
    async fn outcome_records_both_urls() {
        let (outcome, dir) = run_once(Arc::new(QuietNotifier)).await;

        assert_eq!(
            outcome,
            JobOutcome {
                original_url: Some("https://bucket.example/vending/original/req-1".into()),
                annotated_url: Some("https://bucket.example/vending/label/91_req-1".into()),
                notify_attempted: true,
            }
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stalled_notifier_is_cut_off_and_files_are_released() {
        let (outcome, dir) = run_once(Arc::new(StalledNotifier)).await;

        assert!(outcome.original_url.is_some());
        assert!(!outcome.notify_attempted);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
