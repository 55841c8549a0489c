use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::DispatchSettings;
use crate::detection::DetectionResult;
use crate::pipeline::job::{JobRunner, PublishJob};
use crate::storage::temp_store::{ScratchFile, TempStore};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DispatchError {
    #[error("Background queue is full")]
    QueueFull,
    #[error("Background dispatcher is shut down")]
    Closed,
    #[error("Nothing was detected; no job to run")]
    NotDetected,
}

/// Runs publish jobs off the request path.
///
/// Jobs wait in a bounded queue and at most `worker_count` of them run at
/// once. `submit` never waits: when the queue is full the job is rejected
/// and its scratch files are released.
pub struct BackgroundDispatcher {
    sender: Mutex<Option<mpsc::Sender<PublishJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cleanups: Mutex<JoinSet<()>>,
    temp_store: TempStore,
}

impl BackgroundDispatcher {
    /// Must be called from within a tokio runtime.
    pub fn start(runner: Arc<JobRunner>, settings: &DispatchSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let temp_store = runner.temp_store().clone();
        let worker = tokio::spawn(drain_queue(receiver, runner, settings.worker_count.max(1)));

        info!(
            "Background dispatcher started ({} workers, queue capacity {})",
            settings.worker_count, settings.queue_capacity
        );

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            cleanups: Mutex::new(JoinSet::new()),
            temp_store,
        }
    }

    pub fn submit(
        &self,
        result: &DetectionResult,
        original: ScratchFile,
        annotated: ScratchFile,
    ) -> Result<(), DispatchError> {
        if !result.found {
            self.release_later(original, annotated);
            return Err(DispatchError::NotDetected);
        }

        let job = PublishJob {
            id: original.owner().to_string(),
            confidence: result.confidence,
            original,
            annotated,
        };

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            self.release_later(job.original, job.annotated);
            return Err(DispatchError::Closed);
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("Background queue full, dropping job {}", job.id);
                self.release_later(job.original, job.annotated);
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("Background dispatcher closed, dropping job {}", job.id);
                self.release_later(job.original, job.annotated);
                Err(DispatchError::Closed)
            }
        }
    }

    /// Stops accepting jobs and waits for every accepted one to finish,
    /// along with the cleanup of rejected ones.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Background dispatcher stopped abnormally: {}", e);
            }
        }

        let mut cleanups = std::mem::take(
            &mut *self.cleanups.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(done) = cleanups.join_next().await {
            if let Err(e) = done {
                error!("Scratch cleanup task failed: {}", e);
            }
        }
    }

    fn release_later(&self, original: ScratchFile, annotated: ScratchFile) {
        let temp_store = self.temp_store.clone();
        let mut cleanups = self.cleanups.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(done) = cleanups.try_join_next() {
            if let Err(e) = done {
                error!("Scratch cleanup task failed: {}", e);
            }
        }
        cleanups.spawn(async move {
            temp_store.release(&original).await;
            temp_store.release(&annotated).await;
        });
    }
}

async fn drain_queue(
    mut receiver: mpsc::Receiver<PublishJob>,
    runner: Arc<JobRunner>,
    worker_count: usize,
) {
    let permits = Arc::new(Semaphore::new(worker_count));
    let mut running = JoinSet::new();

    // A worker slot is claimed before a job leaves the queue, so waiting
    // jobs never exceed the queue capacity.
    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            error!("Worker permits closed");
            break;
        };
        let Some(job) = receiver.recv().await else {
            break;
        };
        let runner = runner.clone();
        running.spawn(async move {
            let _permit = permit;
            runner.run(job).await;
        });

        while let Some(done) = running.try_join_next() {
            if let Err(e) = done {
                error!("Background job task failed: {}", e);
            }
        }
    }

    while let Some(done) = running.join_next().await {
        if let Err(e) = done {
            error!("Background job task failed: {}", e);
        }
    }
    info!("Background dispatcher drained");
}
