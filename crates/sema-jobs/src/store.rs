use sqlx::SqlitePool;

use crate::error::{JobError, Result};
use crate::job::{IndexJob, JobPatch, JobStatus};

type JobRow = (
    i64,
    i64,
    String,
    Option<String>,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
);

const JOB_COLUMNS: &str =
    "id, user_id, repository, branch, collection, status, vectors_upserted, last_error, indexed_at";

/// `SQLite`-backed job records.
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore").finish_non_exhaustive()
    }
}

impl JobStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the `index_jobs` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                repository TEXT NOT NULL,
                branch TEXT,
                collection TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                vectors_upserted INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                indexed_at TEXT,
                UNIQUE(user_id, repository, branch)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reuse or create the logical job for `(user_id, repository, branch)`.
    ///
    /// An existing record is re-queued and its collection refreshed; its
    /// previous counters and timestamps are left for `mark_processing` to
    /// reset when a worker picks the job up.
    ///
    /// # Errors
    ///
    /// Returns an error if a SQL statement fails.
    pub async fn create_or_get(
        &self,
        user_id: i64,
        repository: &str,
        branch: Option<&str>,
        collection: &str,
    ) -> Result<IndexJob> {
        // `IS` instead of `=` so a NULL branch matches its own record
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM index_jobs WHERE user_id = ? AND repository = ? AND branch IS ?",
        )
        .bind(user_id)
        .bind(repository)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            sqlx::query("UPDATE index_jobs SET collection = ?, status = 'queued' WHERE id = ?")
                .bind(collection)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return self.get(id).await;
        }

        let result = sqlx::query(
            "INSERT INTO index_jobs (user_id, repository, branch, collection, status)
             VALUES (?, ?, ?, ?, 'queued')",
        )
        .bind(user_id)
        .bind(repository)
        .bind(branch)
        .bind(collection)
        .execute(&self.pool)
        .await?;
        self.get(result.last_insert_rowid()).await
    }

    /// Fetch one job by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn get(&self, id: i64) -> Result<IndexJob> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM index_jobs WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let row = row.ok_or(JobError::NotFound(id))?;
        Ok(row_to_job(row))
    }

    /// Apply a partial update and return the refreshed record.
    ///
    /// The merge happens inside a single `UPDATE`, so concurrent patches
    /// cannot overwrite each other's fields with stale reads.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn patch(&self, id: i64, patch: &JobPatch) -> Result<IndexJob> {
        let result = sqlx::query(
            "UPDATE index_jobs
             SET status = COALESCE(?, status),
                 vectors_upserted = COALESCE(?, vectors_upserted),
                 last_error = CASE WHEN ? THEN ? ELSE last_error END,
                 indexed_at = COALESCE(?, indexed_at)
             WHERE id = ?",
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.vectors_upserted)
        .bind(patch.last_error.is_some())
        .bind(patch.last_error.clone().flatten())
        .bind(&patch.indexed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(JobError::NotFound(id));
        }
        self.get(id).await
    }

    /// Transition to `processing`, clearing the previous run's error and
    /// vector count so the record reads fresh during the run.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn mark_processing(&self, id: i64) -> Result<IndexJob> {
        self.patch(
            id,
            &JobPatch {
                status: Some(JobStatus::Processing),
                vectors_upserted: Some(0),
                last_error: Some(None),
                indexed_at: None,
            },
        )
        .await
    }

    /// Terminal success: record the final count and success timestamp.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn mark_done(&self, id: i64, vectors: i64, indexed_at: &str) -> Result<IndexJob> {
        self.patch(
            id,
            &JobPatch {
                status: Some(JobStatus::Done),
                vectors_upserted: Some(vectors),
                last_error: Some(None),
                indexed_at: Some(indexed_at.to_owned()),
            },
        )
        .await
    }

    /// Terminal failure: record the error and the count flushed before the
    /// failure. `indexed_at` keeps the timestamp of the last success.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn mark_failed(&self, id: i64, vectors: i64, error: &str) -> Result<IndexJob> {
        self.patch(
            id,
            &JobPatch {
                status: Some(JobStatus::Failed),
                vectors_upserted: Some(vectors),
                last_error: Some(Some(error.to_owned())),
                indexed_at: None,
            },
        )
        .await
    }

    /// Terminal cancellation, keeping whatever was flushed before the stop.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub async fn mark_cancelled(&self, id: i64, vectors: i64) -> Result<IndexJob> {
        self.patch(
            id,
            &JobPatch {
                status: Some(JobStatus::Cancelled),
                vectors_upserted: Some(vectors),
                last_error: Some(None),
                indexed_at: None,
            },
        )
        .await
    }
}

fn row_to_job(row: JobRow) -> IndexJob {
    let status = JobStatus::parse(&row.5).unwrap_or_else(|| {
        tracing::warn!(job_id = row.0, status = %row.5, "unknown job status in store");
        JobStatus::Failed
    });
    IndexJob {
        id: row.0,
        user_id: row.1,
        repository: row.2,
        branch: row.3,
        collection: row.4,
        status,
        vectors_upserted: row.6,
        last_error: row.7,
        indexed_at: row.8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> JobStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = JobStore::new(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_starts_queued() {
        let store = test_store().await;
        let job = store
            .create_or_get(1, "github.com/acme/app", Some("main"), "col_a")
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.vectors_upserted, 0);
        assert!(job.last_error.is_none());
        assert!(job.indexed_at.is_none());
    }

    #[tokio::test]
    async fn create_or_get_reuses_logical_job() {
        let store = test_store().await;
        let first = store
            .create_or_get(1, "repo", Some("main"), "col_a")
            .await
            .unwrap();
        let second = store
            .create_or_get(1, "repo", Some("main"), "col_b")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.collection, "col_b");

        let other_branch = store
            .create_or_get(1, "repo", Some("dev"), "col_c")
            .await
            .unwrap();
        assert_ne!(first.id, other_branch.id);
    }

    #[tokio::test]
    async fn null_branch_still_deduplicates() {
        let store = test_store().await;
        let first = store.create_or_get(1, "repo", None, "col").await.unwrap();
        let second = store.create_or_get(1, "repo", None, "col").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = test_store().await;
        assert!(matches!(store.get(99).await, Err(JobError::NotFound(99))));
        assert!(matches!(
            store.patch(99, &JobPatch::default()).await,
            Err(JobError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn lifecycle_done_records_count_and_timestamp() {
        let store = test_store().await;
        let job = store.create_or_get(1, "repo", None, "col").await.unwrap();

        let job = store.mark_processing(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        let job = store
            .mark_done(job.id, 42, "2026-08-26T10:00:00Z")
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.vectors_upserted, 42);
        assert_eq!(job.indexed_at.as_deref(), Some("2026-08-26T10:00:00Z"));
    }

    #[tokio::test]
    async fn failed_rerun_keeps_last_success_timestamp() {
        let store = test_store().await;
        let job = store.create_or_get(1, "repo", None, "col").await.unwrap();
        store.mark_processing(job.id).await.unwrap();
        store
            .mark_done(job.id, 10, "2026-08-25T00:00:00Z")
            .await
            .unwrap();

        // re-queued run fails part-way through
        store.create_or_get(1, "repo", None, "col").await.unwrap();
        let job = store.mark_processing(job.id).await.unwrap();
        assert_eq!(job.vectors_upserted, 0);
        assert!(job.last_error.is_none());

        let job = store.mark_failed(job.id, 3, "embedding error").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.vectors_upserted, 3);
        assert_eq!(job.last_error.as_deref(), Some("embedding error"));
        assert_eq!(job.indexed_at.as_deref(), Some("2026-08-25T00:00:00Z"));
    }

    #[tokio::test]
    async fn concurrent_patches_keep_both_fields() {
        // single-connection pool so every in-memory query sees one database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = JobStore::new(pool);
        store.init().await.unwrap();
        let job = store.create_or_get(1, "repo", None, "col").await.unwrap();

        let status_patch = JobPatch {
            status: Some(JobStatus::Processing),
            ..JobPatch::default()
        };
        let count_patch = JobPatch {
            vectors_upserted: Some(9),
            ..JobPatch::default()
        };
        let (a, b) = tokio::join!(
            store.patch(job.id, &status_patch),
            store.patch(job.id, &count_patch),
        );
        a.unwrap();
        b.unwrap();

        // each patch merges in one statement, so neither write is lost
        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.vectors_upserted, 9);
    }

    #[tokio::test]
    async fn mark_processing_clears_previous_error() {
        let store = test_store().await;
        let job = store.create_or_get(1, "repo", None, "col").await.unwrap();
        store.mark_failed(job.id, 0, "boom").await.unwrap();

        let job = store.mark_processing(job.id).await.unwrap();
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn cancelled_keeps_flushed_count() {
        let store = test_store().await;
        let job = store.create_or_get(1, "repo", None, "col").await.unwrap();
        store.mark_processing(job.id).await.unwrap();
        let job = store.mark_cancelled(job.id, 7).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.vectors_upserted, 7);
        assert!(job.last_error.is_none());
    }
}
