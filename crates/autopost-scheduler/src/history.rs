use std::sync::{Arc, Mutex, MutexGuard};

use autopost_core::{JobId, RunId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::{
    db::{init_db, parse_ts, ts},
    error::{Result, ScheduleError},
    types::{RunOutcome, RunRecord, RunState, RunTrigger},
};

/// Everything written when a run finishes.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub outcome: RunOutcome,
    pub completed_at: DateTime<Utc>,
    pub variant: Option<String>,
    pub error_detail: Option<String>,
    pub artifact_ref: Option<String>,
}

/// Append-only audit trail of run attempts.
///
/// A record is written as `started` before the generator is called and moved
/// to `completed` exactly once, so a crash mid-run leaves a visible
/// `started` row behind.
pub trait HistoryLog: Send + Sync {
    fn record_started(
        &self,
        job_id: &JobId,
        trigger: RunTrigger,
        attempted_at: DateTime<Utc>,
    ) -> Result<RunId>;

    fn record_completed(&self, run_id: &RunId, completion: RunCompletion) -> Result<()>;

    /// Most recent records first, optionally for one job only.
    fn recent(&self, job_id: Option<&JobId>, limit: u32) -> Result<Vec<RunRecord>>;
}

pub struct SqliteHistoryLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryLog {
    pub fn new(conn: Connection) -> Result<Self> {
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|_| ScheduleError::StoreUnavailable("connection mutex poisoned".into()))?;
            init_db(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScheduleError::StoreUnavailable("connection mutex poisoned".into()))
    }
}

impl HistoryLog for SqliteHistoryLog {
    fn record_started(
        &self,
        job_id: &JobId,
        trigger: RunTrigger,
        attempted_at: DateTime<Utc>,
    ) -> Result<RunId> {
        let id = RunId::new();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO run_history (id, job_id, run_trigger, state, attempted_at)
             VALUES (?1, ?2, ?3, 'started', ?4)",
            rusqlite::params![id.as_str(), job_id.as_str(), trigger.as_str(), ts(attempted_at)],
        )
        .map_err(ScheduleError::write)?;
        debug!(run_id = %id, job_id = %job_id, "run started");
        Ok(id)
    }

    fn record_completed(&self, run_id: &RunId, completion: RunCompletion) -> Result<()> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE run_history SET state = 'completed', outcome = ?1, completed_at = ?2,
                   variant = ?3, error_detail = ?4, artifact_ref = ?5
                 WHERE id = ?6 AND state = 'started'",
                rusqlite::params![
                    completion.outcome.as_str(),
                    ts(completion.completed_at),
                    completion.variant,
                    completion.error_detail,
                    completion.artifact_ref,
                    run_id.as_str(),
                ],
            )
            .map_err(ScheduleError::write)?;
        if n == 0 {
            return Err(ScheduleError::StoreWriteFailure(format!(
                "run {run_id} is unknown or already completed"
            )));
        }
        Ok(())
    }

    fn recent(&self, job_id: Option<&JobId>, limit: u32) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, job_id, run_trigger, state, outcome, variant, error_detail,
                    artifact_ref, attempted_at, completed_at
             FROM run_history
             WHERE ?1 IS NULL OR job_id = ?1
             ORDER BY attempted_at DESC, id DESC
             LIMIT ?2",
        )?;
        let raws = stmt
            .query_map(
                rusqlite::params![job_id.map(JobId::as_str), limit],
                RawRun::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRun::into_record).collect()
    }
}

struct RawRun {
    id: String,
    job_id: String,
    trigger: String,
    state: String,
    outcome: Option<String>,
    variant: Option<String>,
    error_detail: Option<String>,
    artifact_ref: Option<String>,
    attempted_at: String,
    completed_at: Option<String>,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_id: row.get(1)?,
            trigger: row.get(2)?,
            state: row.get(3)?,
            outcome: row.get(4)?,
            variant: row.get(5)?,
            error_detail: row.get(6)?,
            artifact_ref: row.get(7)?,
            attempted_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<RunRecord> {
        let state = match (self.state.as_str(), self.outcome, self.completed_at) {
            ("started", _, _) => RunState::Started,
            ("completed", Some(outcome), Some(at)) => RunState::Completed {
                outcome: outcome.parse().map_err(ScheduleError::StoreUnavailable)?,
                completed_at: parse_ts(&at)?,
            },
            (other, _, _) => {
                return Err(ScheduleError::StoreUnavailable(format!(
                    "run {} has inconsistent state {other:?}",
                    self.id
                )))
            }
        };
        Ok(RunRecord {
            id: RunId(self.id),
            job_id: JobId(self.job_id),
            trigger: self.trigger.parse().map_err(ScheduleError::StoreUnavailable)?,
            attempted_at: parse_ts(&self.attempted_at)?,
            state,
            variant: self.variant,
            error_detail: self.error_detail,
            artifact_ref: self.artifact_ref,
        })
    }
}
