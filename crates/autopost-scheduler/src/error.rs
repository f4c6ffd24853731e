use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Only [`ScheduleError::StoreWriteFailure`] may leave a claimed job
/// un-advanced; the processor advances the schedule for every other kind.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Another tick already owns this job, or its `next_run` moved on.
    #[error("Job {id} was claimed elsewhere or changed since it was read")]
    ClaimConflict { id: String },

    /// The generator returned an error or did not answer in time.
    #[error("Generator failure: {0}")]
    GeneratorFailure(String),

    /// The recurrence rule cannot produce a next run time.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// The store rejected a write; the job stays due and is retried next tick.
    #[error("Store write failed: {0}")]
    StoreWriteFailure(String),

    /// The variant policy has nothing eligible to pick.
    #[error("No eligible variant: {0}")]
    VariantUnavailable(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The store cannot be reached at all.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Underlying SQLite / rusqlite error on a read path.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ScheduleError {
    /// Short error code string used in logs, run records and HTTP replies.
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::ClaimConflict { .. } => "CLAIM_CONFLICT",
            ScheduleError::GeneratorFailure(_) => "GENERATOR_FAILURE",
            ScheduleError::InvalidRule(_) => "INVALID_RULE",
            ScheduleError::StoreWriteFailure(_) => "STORE_WRITE_FAILURE",
            ScheduleError::VariantUnavailable(_) => "VARIANT_UNAVAILABLE",
            ScheduleError::JobNotFound { .. } => "JOB_NOT_FOUND",
            ScheduleError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            ScheduleError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Map a rusqlite error raised by a write into the write-failure kind.
    pub(crate) fn write(err: rusqlite::Error) -> Self {
        ScheduleError::StoreWriteFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
