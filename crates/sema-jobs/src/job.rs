use serde::{Deserialize, Serialize};

/// Lifecycle of one ingestion job.
///
/// `Queued` and `Processing` are transient; `Done`, `Failed`, and
/// `Cancelled` are terminal for a run. The same logical record, keyed by
/// user, repository, and branch, is reused across re-indexing runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one ingestion job.
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub id: i64,
    pub user_id: i64,
    pub repository: String,
    pub branch: Option<String>,
    pub collection: String,
    pub status: JobStatus,
    pub vectors_upserted: i64,
    pub last_error: Option<String>,
    /// RFC 3339 timestamp of the last successful run.
    pub indexed_at: Option<String>,
}

/// Partial update applied by `JobStore::patch`.
///
/// `last_error` is doubly optional: the outer level means "change it", the
/// inner level is the new value, so an error can be explicitly cleared.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub vectors_upserted: Option<i64>,
    pub last_error: Option<Option<String>>,
    pub indexed_at: Option<String>,
}
