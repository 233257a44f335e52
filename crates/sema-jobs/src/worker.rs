use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use sema_embed::Embedder;
use sema_index::error::IngestError;
use sema_index::pipeline::Ingestor;
use sema_index::store::UpsertBuffer;

use crate::store::JobStore;

/// Hook invoked after a job completes successfully, so the owning
/// repository record can refresh its indexed timestamp.
pub trait RepoNotifier: Send + Sync {
    fn indexing_refreshed(&self, repository: &str, indexed_at: &str);
}

/// One unit of work pulled by a worker.
#[derive(Debug)]
pub struct JobRequest {
    pub job_id: i64,
    /// Materialized checkout to ingest.
    pub root: PathBuf,
    pub repo: String,
    /// Remove `root` when the run finishes, whatever the outcome.
    pub cleanup: bool,
    /// Flips to true when the job should stop between files.
    pub cancel: watch::Receiver<bool>,
}

/// Cloneable submission handle for the worker queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobRequest>,
}

impl JobQueue {
    /// Enqueue a job. Returns false when all workers have stopped.
    pub async fn submit(&self, request: JobRequest) -> bool {
        self.tx.send(request).await.is_ok()
    }
}

/// Create a bounded job queue.
#[must_use]
pub fn job_channel(capacity: usize) -> (JobQueue, mpsc::Receiver<JobRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, rx)
}

/// Pool of worker tasks pulling jobs from a shared queue.
///
/// Workers stop when the queue closes or the shutdown signal fires; a job
/// already running is finished first.
pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<E: Embedder + 'static>(
        workers: usize,
        rx: mpsc::Receiver<JobRequest>,
        store: JobStore,
        ingestor: Arc<Ingestor<E>>,
        notifier: Option<Arc<dyn RepoNotifier>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let store = store.clone();
                let ingestor = Arc::clone(&ingestor);
                let notifier = notifier.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        let request = {
                            let mut rx = rx.lock().await;
                            tokio::select! {
                                request = rx.recv() => request,
                                _ = shutdown.changed() => None,
                            }
                        };
                        let Some(request) = request else {
                            tracing::debug!(worker, "worker stopping");
                            break;
                        };
                        execute(&store, &ingestor, notifier.as_deref(), request).await;
                    }
                })
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker task to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("worker task panicked: {e}");
            }
        }
    }
}

/// Run one job to a terminal state.
///
/// Every failure is captured into the job record; nothing propagates past
/// this boundary.
async fn execute<E: Embedder>(
    store: &JobStore,
    ingestor: &Arc<Ingestor<E>>,
    notifier: Option<&dyn RepoNotifier>,
    request: JobRequest,
) {
    let job_id = request.job_id;
    let _guard = CheckoutGuard {
        path: request.root.clone(),
        enabled: request.cleanup,
    };

    let job = match store.mark_processing(job_id).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(job_id, "cannot mark job processing: {e}");
            return;
        }
    };
    tracing::info!(job_id, repo = %request.repo, collection = %job.collection, "job started");

    let mut buffer = UpsertBuffer::new(
        ingestor.store().as_ref(),
        &job.collection,
        ingestor.config().batch_size,
    );
    let result = ingestor
        .run(&mut buffer, &request.root, &request.repo, &request.cancel)
        .await;
    let vectors = i64::try_from(buffer.total_upserted()).unwrap_or(i64::MAX);

    let outcome = match result {
        Ok(report) => {
            let indexed_at = chrono::Utc::now().to_rfc3339();
            tracing::info!(
                job_id,
                files = report.files_indexed,
                chunks = report.chunks_upserted,
                ms = report.duration_ms,
                "job done"
            );
            if let Some(notifier) = notifier {
                notifier.indexing_refreshed(&request.repo, &indexed_at);
            }
            store.mark_done(job_id, vectors, &indexed_at).await
        }
        Err(IngestError::Cancelled) => {
            tracing::info!(job_id, "job cancelled");
            store.mark_cancelled(job_id, vectors).await
        }
        Err(e) => {
            tracing::warn!(job_id, "job failed: {e}");
            store.mark_failed(job_id, vectors, &e.to_string()).await
        }
    };
    if let Err(e) = outcome {
        tracing::error!(job_id, "cannot record terminal job state: {e}");
    }
}

/// Removes a transient checkout on every exit path.
struct CheckoutGuard {
    path: PathBuf,
    enabled: bool,
}

impl Drop for CheckoutGuard {
    fn drop(&mut self) {
        if self.enabled
            && self.path.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.path)
        {
            tracing::warn!(path = %self.path.display(), "checkout cleanup failed: {e}");
        }
    }
}
