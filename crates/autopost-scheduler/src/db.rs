use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::{Result, ScheduleError};

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` and `run_history` tables (idempotent) plus the indexes
/// the due-job poll and the history listing rely on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                   TEXT    NOT NULL PRIMARY KEY,
            name                 TEXT    NOT NULL,
            rule                 TEXT    NOT NULL,   -- JSON-encoded Rule enum
            variant_policy       TEXT    NOT NULL,   -- JSON-encoded VariantPolicy
            payload_ref          TEXT    NOT NULL,
            topic_override       TEXT,
            next_run             TEXT    NOT NULL,   -- RFC 3339, whole seconds, UTC
            last_run             TEXT,
            active               INTEGER NOT NULL DEFAULT 1,
            status               TEXT    NOT NULL DEFAULT 'scheduled',
            run_count            INTEGER NOT NULL DEFAULT 0,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            claim_token          TEXT,               -- NULL when unclaimed
            claimed_at           TEXT,
            created_at           TEXT    NOT NULL,
            updated_at           TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE active = 1 AND next_run <= ? ORDER BY next_run
        CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs (active, next_run);

        CREATE TABLE IF NOT EXISTS run_history (
            id            TEXT NOT NULL PRIMARY KEY,
            job_id        TEXT NOT NULL,
            run_trigger   TEXT NOT NULL,
            state         TEXT NOT NULL DEFAULT 'started',
            outcome       TEXT,
            variant       TEXT,
            error_detail  TEXT,
            artifact_ref  TEXT,
            attempted_at  TEXT NOT NULL,
            completed_at  TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_run_history_job ON run_history (job_id, attempted_at);
        ",
    )?;
    Ok(())
}

/// Canonical stored form of a timestamp: `2024-03-04T10:00:00Z`.
///
/// Claims compare `next_run` by string equality, so every write must go
/// through this function.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScheduleError::StoreUnavailable(format!("corrupt timestamp {raw:?}: {e}")))
}
