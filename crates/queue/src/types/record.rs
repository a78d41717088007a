use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobMessage, LeaseToken};

/// Job status lifecycle. Five states, matching the queue's state machine:
/// a job starts `Pending` (eligible once `message.run_at` has passed), a
/// worker claims it into `Processing`, and it ends in `Completed` or,
/// after exhausting retries, `Failed`. In between a recoverable error
/// sends it back through `Retrying` until the next `retry_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is queued and waiting to be processed
    Pending,

    /// Job is currently being processed by a worker
    Processing { lease_until: DateTime<Utc> },

    /// Job failed with a transient error and is waiting to be retried
    Retrying { retry_at: DateTime<Utc> },

    /// Job completed successfully
    Completed { completed_at: DateTime<Utc> },

    /// Job failed permanently (max retries exceeded or a non-retryable error)
    Failed { failed_at: DateTime<Utc>, error: String },
}

impl JobStatus {
    /// Check if the job is in a terminal state (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Check if the job is currently being processed
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }

    /// Check if the status alone (ignoring `run_at`) permits a dequeue pass
    /// to consider this job.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Pending => true,
            Self::Retrying { retry_at } => *retry_at <= now,
            _ => false,
        }
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing { .. } => "processing",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Job record - mutable runtime state stored by backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub job_id: JobId,

    /// Immutable job message data
    pub message: JobMessage,

    /// Current job status
    pub status: JobStatus,

    /// Current attempt number (starts at 0)
    pub attempt: u32,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last updated
    pub updated_at: DateTime<Utc>,

    /// Last error message (if any)
    pub last_error: Option<String>,

    /// Current lease token (if processing)
    pub lease_token: Option<LeaseToken>,

    /// When the current lease expires (if processing)
    pub lease_until: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new job record
    pub fn new(job_id: JobId, message: JobMessage) -> Self {
        let now = Utc::now();

        Self {
            job_id,
            message,
            status: JobStatus::Pending,
            attempt: 0,
            created_at: now,
            updated_at: now,
            last_error: None,
            lease_token: None,
            lease_until: None,
        }
    }

    /// Whether this record is eligible for a dequeue pass right now:
    /// the status permits it and `run_at`/`retry_at` has passed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status.is_eligible(now) && self.message.run_at <= now
    }

    /// Check if the job can be retried
    pub fn can_retry(&self) -> bool {
        self.attempt < self.message.max_retries && !self.status.is_terminal()
    }

    /// Check if the lease has expired
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.status, &self.lease_until) {
            (JobStatus::Processing { .. }, Some(lease_until)) => *lease_until < now,
            _ => false,
        }
    }

    /// Update the job status and timestamp
    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Set an error and update timestamp
    pub fn set_error(&mut self, error: String) {
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Start processing with a lease
    pub fn start_processing(&mut self, lease_token: LeaseToken, lease_until: DateTime<Utc>) {
        self.status = JobStatus::Processing { lease_until };
        self.lease_token = Some(lease_token);
        self.lease_until = Some(lease_until);
        self.updated_at = Utc::now();
    }

    /// Complete the job successfully
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed {
            completed_at: Utc::now(),
        };
        self.lease_token = None;
        self.lease_until = None;
        self.updated_at = Utc::now();
    }

    /// Fail the job permanently
    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed {
            failed_at: Utc::now(),
            error: error.clone(),
        };
        self.last_error = Some(error);
        self.lease_token = None;
        self.lease_until = None;
        self.updated_at = Utc::now();
    }

    /// Schedule a retry. `attempt` is already incremented at `dequeue`
    /// time (the claim is the attempt); this only moves the job back to
    /// `Retrying`.
    pub fn schedule_retry(&mut self, retry_at: DateTime<Utc>) {
        self.status = JobStatus::Retrying { retry_at };
        self.lease_token = None;
        self.lease_until = None;
        self.updated_at = Utc::now();
    }
}

/// A job that has been leased for processing
#[derive(Debug, Clone)]
pub struct LeasedJob {
    /// The job record
    pub record: JobRecord,

    /// Lease token for acknowledgment
    pub lease_token: LeaseToken,

    /// When the lease expires
    pub lease_until: DateTime<Utc>,
}

impl LeasedJob {
    /// Create a new leased job
    pub fn new(record: JobRecord, lease_token: LeaseToken, lease_until: DateTime<Utc>) -> Self {
        Self {
            record,
            lease_token,
            lease_until,
        }
    }

    /// Get the job ID
    pub fn job_id(&self) -> &JobId {
        &self.record.job_id
    }

    /// Get the job message
    pub fn message(&self) -> &JobMessage {
        &self.record.message
    }

    /// Check if the lease is still valid
    pub fn lease_valid(&self, now: DateTime<Utc>) -> bool {
        self.lease_until > now
    }

    /// Get time remaining on lease
    pub fn lease_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.lease_until - now
    }
}
