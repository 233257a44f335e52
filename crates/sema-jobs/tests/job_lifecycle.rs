use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use sema_embed::mock::MockEmbedder;
use sema_index::chunker::TokenChunker;
use sema_index::extractor::Extractor;
use sema_index::pipeline::{IngestConfig, Ingestor};
use sema_index::store::{InMemoryStore, VectorStore};
use sema_jobs::{JobQueue, JobRequest, JobStatus, JobStore, WorkerPool, job_channel};

/// Whitespace word-level tokenizer; every `wN` word is exactly one token.
fn word_tokenizer() -> tokenizers::Tokenizer {
    let mut vocab = String::from("\"[UNK]\": 0");
    for i in 0..1500 {
        vocab.push_str(&format!(", \"w{i}\": {}", i + 1));
    }
    let json = format!(
        "{{\"version\":\"1.0\",\"truncation\":null,\"padding\":null,\
         \"added_tokens\":[],\"normalizer\":null,\
         \"pre_tokenizer\":{{\"type\":\"Whitespace\"}},\
         \"post_processor\":null,\"decoder\":null,\
         \"model\":{{\"type\":\"WordLevel\",\"vocab\":{{{vocab}}},\
         \"unk_token\":\"[UNK]\"}}}}"
    );
    tokenizers::Tokenizer::from_bytes(json.as_bytes()).unwrap()
}

fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("w{}", i % 1500))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_three_file_repo(dir: &Path) {
    std::fs::write(
        dir.join("a.go"),
        "package a\n\nfunc Add(x int, y int) int {\n\treturn x + y\n}\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("b.go"),
        "package b\n\nfunc Sub(x int, y int) int {\n\treturn x - y\n}\n",
    )
    .unwrap();
    std::fs::write(dir.join("README.md"), words(1300)).unwrap();
}

struct Harness {
    store: JobStore,
    vector_store: Arc<InMemoryStore>,
    queue: JobQueue,
    pool: WorkerPool,
    _shutdown: watch::Sender<bool>,
}

async fn harness(embedder: MockEmbedder, batch_size: usize) -> Harness {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = JobStore::new(pool);
    store.init().await.unwrap();

    let vector_store = Arc::new(InMemoryStore::new());
    let ingestor = Arc::new(Ingestor::new(
        Arc::new(Extractor::new()),
        Arc::new(TokenChunker::new(word_tokenizer())),
        Arc::new(embedder),
        Arc::clone(&vector_store) as Arc<dyn VectorStore>,
        IngestConfig {
            batch_size,
            ..IngestConfig::default()
        },
    ));

    let (queue, rx) = job_channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_pool = WorkerPool::spawn(2, rx, store.clone(), ingestor, None, shutdown_rx);

    Harness {
        store,
        vector_store,
        queue,
        pool: worker_pool,
        _shutdown: shutdown_tx,
    }
}

async fn wait_terminal(store: &JobStore, job_id: i64) -> sema_jobs::IndexJob {
    for _ in 0..500 {
        let job = store.get(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

fn no_cancel() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

#[tokio::test]
async fn successful_run_lands_done_with_counts() {
    let dir = tempfile::tempdir().unwrap();
    write_three_file_repo(dir.path());

    let h = harness(MockEmbedder::new(4), 64).await;
    let job = h
        .store
        .create_or_get(1, "acme/app", Some("main"), "col")
        .await
        .unwrap();
    assert!(
        h.queue
            .submit(JobRequest {
                job_id: job.id,
                root: dir.path().to_path_buf(),
                repo: "acme/app".into(),
                cleanup: false,
                cancel: no_cancel(),
            })
            .await
    );

    let job = wait_terminal(&h.store, job.id).await;
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.vectors_upserted, 5);
    assert!(job.last_error.is_none());
    assert!(job.indexed_at.is_some());
    assert_eq!(h.vector_store.point_count("col"), 5);
}

#[tokio::test]
async fn embed_failure_lands_failed_with_partial_count() {
    let dir = tempfile::tempdir().unwrap();
    write_three_file_repo(dir.path());

    // first per-file batch succeeds, second fails; batch size 1 flushes
    // every point immediately
    let h = harness(MockEmbedder::failing_after(4, 1), 1).await;
    let job = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    h.queue
        .submit(JobRequest {
            job_id: job.id,
            root: dir.path().to_path_buf(),
            repo: "acme/app".into(),
            cleanup: false,
            cancel: no_cancel(),
        })
        .await;

    let job = wait_terminal(&h.store, job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("embedding"));
    // only the first file's chunks were flushed before the failure
    assert_eq!(job.vectors_upserted, 1);
    assert!(job.indexed_at.is_none());
}

#[tokio::test]
async fn cancelled_job_lands_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    write_three_file_repo(dir.path());

    let h = harness(MockEmbedder::new(4), 64).await;
    let job = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    let (cancel_tx, cancel_rx) = watch::channel(true);
    h.queue
        .submit(JobRequest {
            job_id: job.id,
            root: dir.path().to_path_buf(),
            repo: "acme/app".into(),
            cleanup: false,
            cancel: cancel_rx,
        })
        .await;

    let job = wait_terminal(&h.store, job.id).await;
    drop(cancel_tx);
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.vectors_upserted, 0);
    assert!(job.last_error.is_none());
}

#[tokio::test]
async fn cleanup_removes_checkout_on_success() {
    let parent = tempfile::tempdir().unwrap();
    let checkout = parent.path().join("checkout");
    std::fs::create_dir(&checkout).unwrap();
    write_three_file_repo(&checkout);

    let h = harness(MockEmbedder::new(4), 64).await;
    let job = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    h.queue
        .submit(JobRequest {
            job_id: job.id,
            root: checkout.clone(),
            repo: "acme/app".into(),
            cleanup: true,
            cancel: no_cancel(),
        })
        .await;

    wait_terminal(&h.store, job.id).await;
    // the guard drops just after the terminal state is recorded
    for _ in 0..100 {
        if !checkout.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!checkout.exists());
}

#[tokio::test]
async fn rerun_after_success_reuses_record() {
    let dir = tempfile::tempdir().unwrap();
    write_three_file_repo(dir.path());

    let h = harness(MockEmbedder::new(4), 64).await;
    let first = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    h.queue
        .submit(JobRequest {
            job_id: first.id,
            root: dir.path().to_path_buf(),
            repo: "acme/app".into(),
            cleanup: false,
            cancel: no_cancel(),
        })
        .await;
    wait_terminal(&h.store, first.id).await;

    let second = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, JobStatus::Queued);

    h.queue
        .submit(JobRequest {
            job_id: second.id,
            root: dir.path().to_path_buf(),
            repo: "acme/app".into(),
            cleanup: false,
            cancel: no_cancel(),
        })
        .await;
    let job = wait_terminal(&h.store, second.id).await;
    assert_eq!(job.status, JobStatus::Done);
    // deterministic point ids: re-indexing overwrote, never duplicated
    assert_eq!(h.vector_store.point_count("col"), 5);
}

#[tokio::test]
async fn pool_drains_queue_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    write_three_file_repo(dir.path());

    let h = harness(MockEmbedder::new(4), 64).await;
    let job = h
        .store
        .create_or_get(1, "acme/app", None, "col")
        .await
        .unwrap();
    h.queue
        .submit(JobRequest {
            job_id: job.id,
            root: dir.path().to_path_buf(),
            repo: "acme/app".into(),
            cleanup: false,
            cancel: no_cancel(),
        })
        .await;

    drop(h.queue);
    h.pool.join().await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
}
