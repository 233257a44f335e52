//! Resumable ingestion jobs: persistence, queue, and worker pool.
//!
//! A job record is keyed by user, repository, and branch, and is reused
//! across re-indexing runs. Workers pull queued requests, drive the
//! ingestion pipeline, and always land the record in a terminal state.

pub mod error;
pub mod job;
pub mod store;
pub mod worker;

pub use error::{JobError, Result};
pub use job::{IndexJob, JobPatch, JobStatus};
pub use store::JobStore;
pub use worker::{JobQueue, JobRequest, RepoNotifier, WorkerPool, job_channel};
