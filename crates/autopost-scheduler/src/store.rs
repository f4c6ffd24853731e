use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use autopost_core::config::DEFAULT_CLAIM_LEASE_SECS;
use autopost_core::JobId;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    db::{init_db, parse_ts, ts},
    error::{Result, ScheduleError},
    schedule::initial_next_run,
    types::{Job, JobStatus, NewJob, Rule, VariantPolicy},
};

const JOB_COLUMNS: &str = "id, name, rule, variant_policy, payload_ref, topic_override,
     next_run, last_run, active, status, run_count, consecutive_failures,
     created_at, updated_at";

/// Proof that the holder won the conditional write for one job.
///
/// Not `Clone`: releasing consumes it, and a successful advance clears the
/// token in the store, so one claim drives at most one transition.
#[derive(Debug)]
pub struct ClaimToken {
    job_id: JobId,
    token: String,
    expected_next_run: DateTime<Utc>,
    claimed_at: DateTime<Utc>,
}

impl ClaimToken {
    /// Minted by store implementations after a successful conditional write.
    pub fn new(job_id: JobId, expected_next_run: DateTime<Utc>, claimed_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            token: Uuid::new_v4().to_string(),
            expected_next_run,
            claimed_at,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `next_run` value the claim was taken against.
    pub fn expected_next_run(&self) -> DateTime<Utc> {
        self.expected_next_run
    }

    pub fn claimed_at(&self) -> DateTime<Utc> {
        self.claimed_at
    }
}

/// State written when a claimed run finishes.
#[derive(Debug, Clone)]
pub struct Advance {
    /// `None` keeps the current `next_run` (used when the job is retired).
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub deactivate: bool,
    pub status: JobStatus,
}

/// Persistence for jobs with atomic claim-and-advance semantics.
pub trait ScheduleStore: Send + Sync {
    /// Active, unclaimed jobs with `next_run <= now`, oldest first. Read-only.
    fn find_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Job>>;

    fn get_job(&self, id: &JobId) -> Result<Job>;

    /// Claim `job_id` if its `next_run` still equals `expected_next_run`.
    ///
    /// Returns [`ScheduleError::ClaimConflict`] when another caller got there
    /// first or the row changed.
    fn try_claim(&self, job_id: &JobId, expected_next_run: DateTime<Utc>) -> Result<ClaimToken>;

    /// Write the post-run state and drop the claim in one statement.
    ///
    /// On error the claim is still held and should be released.
    fn advance_after_run(&self, claim: &ClaimToken, advance: Advance) -> Result<()>;

    /// Drop the claim without touching `next_run`, leaving the job due.
    fn release_claim(&self, claim: ClaimToken) -> Result<()>;
}

/// SQLite-backed [`ScheduleStore`] plus the job management operations used
/// by the CLI and HTTP surfaces.
pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    claim_lease: Duration,
}

impl SqliteScheduleStore {
    pub fn new(conn: Connection) -> Result<Self> {
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    /// Build on a connection shared with other components (e.g. the history log).
    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|_| ScheduleError::StoreUnavailable("connection mutex poisoned".into()))?;
            init_db(&guard)?;
        }
        Ok(Self {
            conn,
            clock: Arc::new(SystemClock),
            claim_lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS as i64),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claims older than `lease` are treated as abandoned by a crashed tick.
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScheduleError::StoreUnavailable("connection mutex poisoned".into()))
    }

    fn lease_cutoff(&self) -> String {
        ts(self.clock.now() - self.claim_lease)
    }

    /// Create a job and compute its first `next_run`.
    pub fn insert_job(&self, new: NewJob) -> Result<Job> {
        let now = self.clock.now();
        let anchor = new.start_at.unwrap_or(now).trunc_subsecs(0);
        let rule = new.rule.to_whole_seconds();
        let next_run = initial_next_run(&rule, anchor, now)?;
        let id = JobId::new();
        let rule_json = serde_json::to_string(&rule)
            .map_err(|e| ScheduleError::InvalidRule(e.to_string()))?;
        let policy_json = serde_json::to_string(&new.variant_policy)
            .map_err(|e| ScheduleError::VariantUnavailable(e.to_string()))?;
        let now_str = ts(now);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs
             (id, name, rule, variant_policy, payload_ref, topic_override,
              next_run, last_run, active, status, run_count, consecutive_failures,
              created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,NULL,1,'scheduled',0,0,?8,?8)",
            rusqlite::params![
                id.as_str(),
                new.name,
                rule_json,
                policy_json,
                new.payload_ref,
                new.topic_override,
                ts(next_run),
                now_str,
            ],
        )
        .map_err(ScheduleError::write)?;

        info!(job_id = %id, name = %new.name, next_run = %ts(next_run), "job added");

        Ok(Job {
            id,
            name: new.name,
            rule,
            next_run,
            last_run: None,
            active: true,
            status: JobStatus::Scheduled,
            topic_override: new.topic_override,
            variant_policy: new.variant_policy,
            payload_ref: new.payload_ref,
            run_count: 0,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// All jobs ordered by creation time.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at, id"
        ))?;
        let raws = stmt
            .query_map([], RawJob::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawJob::into_job).collect()
    }

    /// Active jobs ordered by their next run, soonest first.
    pub fn upcoming(&self, limit: u32) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE active = 1
             ORDER BY next_run ASC, id ASC LIMIT ?1"
        ))?;
        let raws = stmt
            .query_map([limit], RawJob::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawJob::into_job).collect()
    }

    /// Pause or resume a job. Resuming also clears its failure streak.
    pub fn set_active(&self, id: &JobId, active: bool) -> Result<Job> {
        let status = if active {
            JobStatus::Scheduled
        } else {
            JobStatus::Deactivated
        };
        let n = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE jobs SET active = ?1, status = ?2,
                   consecutive_failures = CASE WHEN ?1 THEN 0 ELSE consecutive_failures END,
                   updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![active, status.as_str(), ts(self.clock.now()), id.as_str()],
            )
            .map_err(ScheduleError::write)?
        };
        if n == 0 {
            return Err(ScheduleError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, active, "job activation changed");
        self.get_job(id)
    }

    /// Remove a job by ID. Returns `JobNotFound` if no row is deleted.
    pub fn remove_job(&self, id: &JobId) -> Result<()> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM jobs WHERE id = ?1", [id.as_str()])
            .map_err(ScheduleError::write)?;
        if n == 0 {
            return Err(ScheduleError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job removed");
        Ok(())
    }

    /// Number of jobs per status, for the dashboard and `jobs list` footer.
    pub fn count_by_status(&self) -> Result<BTreeMap<String, u32>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(counts)
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn find_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE active = 1 AND next_run <= ?1
               AND (claim_token IS NULL OR claimed_at <= ?2)
             ORDER BY next_run ASC, id ASC
             LIMIT ?3"
        ))?;
        let raws = stmt
            .query_map(
                rusqlite::params![ts(now), self.lease_cutoff(), limit],
                RawJob::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // A row whose stored JSON no longer parses cannot be run; leave it for
        // an operator rather than failing the whole tick.
        Ok(raws
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id.clone();
                match raw.into_job() {
                    Ok(job) => Some(job),
                    Err(e) => {
                        error!(job_id = %id, "unreadable job row skipped: {e}");
                        None
                    }
                }
            })
            .collect())
    }

    fn get_job(&self, id: &JobId) -> Result<Job> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id.as_str()],
                RawJob::from_row,
            )
            .optional()?
            .ok_or_else(|| ScheduleError::JobNotFound { id: id.to_string() })?;
        raw.into_job()
    }

    fn try_claim(&self, job_id: &JobId, expected_next_run: DateTime<Utc>) -> Result<ClaimToken> {
        let claimed_at = self.clock.now();
        let claim = ClaimToken::new(job_id.clone(), expected_next_run, claimed_at);

        let n = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE jobs SET claim_token = ?1, claimed_at = ?2, status = 'running',
                   updated_at = ?2
                 WHERE id = ?3 AND next_run = ?4 AND active = 1
                   AND (claim_token IS NULL OR claimed_at <= ?5)",
                rusqlite::params![
                    claim.token(),
                    ts(claimed_at),
                    job_id.as_str(),
                    ts(expected_next_run),
                    self.lease_cutoff(),
                ],
            )
            .map_err(ScheduleError::write)?
        };

        if n == 0 {
            debug!(job_id = %job_id, "claim lost to a concurrent tick");
            return Err(ScheduleError::ClaimConflict {
                id: job_id.to_string(),
            });
        }
        debug!(job_id = %job_id, "job claimed");
        Ok(claim)
    }

    fn advance_after_run(&self, claim: &ClaimToken, advance: Advance) -> Result<()> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE jobs SET
                   next_run = COALESCE(?1, next_run),
                   last_run = ?2,
                   run_count = run_count + 1,
                   consecutive_failures = ?3,
                   active = CASE WHEN ?4 THEN 0 ELSE active END,
                   status = ?5,
                   claim_token = NULL,
                   claimed_at = NULL,
                   updated_at = ?6
                 WHERE id = ?7 AND claim_token = ?8",
                rusqlite::params![
                    advance.next_run.map(ts),
                    ts(advance.last_run),
                    advance.consecutive_failures,
                    advance.deactivate,
                    advance.status.as_str(),
                    ts(self.clock.now()),
                    claim.job_id.as_str(),
                    claim.token.as_str(),
                ],
            )
            .map_err(ScheduleError::write)?;

        if n == 0 {
            return Err(ScheduleError::StoreWriteFailure(format!(
                "claim on job {} is no longer held",
                claim.job_id
            )));
        }
        Ok(())
    }

    fn release_claim(&self, claim: ClaimToken) -> Result<()> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE jobs SET claim_token = NULL, claimed_at = NULL, status = 'scheduled',
                   updated_at = ?1
                 WHERE id = ?2 AND claim_token = ?3",
                rusqlite::params![ts(self.clock.now()), claim.job_id.as_str(), claim.token],
            )
            .map_err(ScheduleError::write)?;
        if n == 0 {
            return Err(ScheduleError::StoreWriteFailure(format!(
                "claim on job {} is no longer held",
                claim.job_id
            )));
        }
        debug!(job_id = %claim.job_id, "claim released");
        Ok(())
    }
}

/// Column values as stored, before JSON and timestamp decoding.
struct RawJob {
    id: String,
    name: String,
    rule: String,
    variant_policy: String,
    payload_ref: String,
    topic_override: Option<String>,
    next_run: String,
    last_run: Option<String>,
    active: bool,
    status: String,
    run_count: u32,
    consecutive_failures: u32,
    created_at: String,
    updated_at: String,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            rule: row.get(2)?,
            variant_policy: row.get(3)?,
            payload_ref: row.get(4)?,
            topic_override: row.get(5)?,
            next_run: row.get(6)?,
            last_run: row.get(7)?,
            active: row.get(8)?,
            status: row.get(9)?,
            run_count: row.get(10)?,
            consecutive_failures: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let rule: Rule = serde_json::from_str(&self.rule)
            .map_err(|e| ScheduleError::InvalidRule(format!("stored rule: {e}")))?;
        let variant_policy: VariantPolicy = serde_json::from_str(&self.variant_policy)
            .map_err(|e| ScheduleError::VariantUnavailable(format!("stored policy: {e}")))?;
        let status: JobStatus = self
            .status
            .parse()
            .map_err(ScheduleError::StoreUnavailable)?;
        Ok(Job {
            id: JobId(self.id),
            name: self.name,
            rule,
            next_run: parse_ts(&self.next_run)?,
            last_run: self.last_run.as_deref().map(parse_ts).transpose()?,
            active: self.active,
            status,
            topic_override: self.topic_override,
            variant_policy,
            payload_ref: self.payload_ref,
            run_count: self.run_count,
            consecutive_failures: self.consecutive_failures,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::IntervalUnit;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn store_at(now: &str) -> (SqliteScheduleStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(now)));
        let store = SqliteScheduleStore::new(Connection::open_in_memory().unwrap())
            .unwrap()
            .with_clock(clock.clone());
        (store, clock)
    }

    fn hourly_job(name: &str, start: &str) -> NewJob {
        NewJob {
            name: name.to_string(),
            rule: Rule::FixedInterval {
                unit: IntervalUnit::Hour,
                count: 1,
            },
            start_at: Some(at(start)),
            topic_override: None,
            variant_policy: VariantPolicy::Fixed {
                variant: "default".to_string(),
            },
            payload_ref: "template:7".to_string(),
        }
    }

    fn advance_to(next: &str, last: &str) -> Advance {
        Advance {
            next_run: Some(at(next)),
            last_run: at(last),
            consecutive_failures: 0,
            deactivate: false,
            status: JobStatus::Scheduled,
        }
    }

    #[test]
    fn find_due_orders_by_next_run_and_respects_limit() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        store.insert_job(hourly_job("late", "2024-03-04T09:40:00Z")).unwrap();
        store.insert_job(hourly_job("early", "2024-03-04T09:10:00Z")).unwrap();
        store.insert_job(hourly_job("future", "2024-03-04T12:00:00Z")).unwrap();

        let due = store.find_due(at("2024-03-04T10:00:00Z"), 10).unwrap();
        let names: Vec<_> = due.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);

        let limited = store.find_due(at("2024-03-04T10:00:00Z"), 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].name, "early");
    }

    #[test]
    fn second_claim_on_same_next_run_conflicts() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T10:00:00Z")).unwrap();

        let claim = store.try_claim(&job.id, job.next_run).unwrap();
        assert_eq!(claim.job_id(), &job.id);

        let err = store.try_claim(&job.id, job.next_run).unwrap_err();
        assert!(matches!(err, ScheduleError::ClaimConflict { .. }));
        assert_eq!(store.get_job(&job.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn claim_against_stale_next_run_conflicts() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T10:00:00Z")).unwrap();
        let err = store
            .try_claim(&job.id, at("2024-03-04T09:00:00Z"))
            .unwrap_err();
        assert_eq!(err.code(), "CLAIM_CONFLICT");
    }

    #[test]
    fn claimed_jobs_are_not_reported_due() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T09:00:00Z")).unwrap();
        let _claim = store.try_claim(&job.id, job.next_run).unwrap();
        assert!(store.find_due(at("2024-03-04T09:30:00Z"), 10).unwrap().is_empty());
    }

    #[test]
    fn advance_moves_next_run_and_clears_claim() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T10:00:00Z")).unwrap();
        let claim = store.try_claim(&job.id, job.next_run).unwrap();

        store
            .advance_after_run(&claim, advance_to("2024-03-04T11:00:00Z", "2024-03-04T10:05:00Z"))
            .unwrap();

        let after = store.get_job(&job.id).unwrap();
        assert_eq!(after.next_run, at("2024-03-04T11:00:00Z"));
        assert_eq!(after.last_run, Some(at("2024-03-04T10:05:00Z")));
        assert_eq!(after.run_count, 1);
        assert_eq!(after.status, JobStatus::Scheduled);

        // the new next_run is claimable again
        assert!(store.try_claim(&job.id, after.next_run).is_ok());
    }

    #[test]
    fn advance_with_unknown_token_is_a_write_failure() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T10:00:00Z")).unwrap();
        let forged = ClaimToken::new(job.id.clone(), job.next_run, at("2024-03-04T09:00:00Z"));

        let err = store
            .advance_after_run(&forged, advance_to("2024-03-04T11:00:00Z", "2024-03-04T10:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::StoreWriteFailure(_)));
        assert_eq!(store.get_job(&job.id).unwrap().next_run, job.next_run);
    }

    #[test]
    fn released_claim_leaves_job_due() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T09:00:00Z")).unwrap();
        let claim = store.try_claim(&job.id, job.next_run).unwrap();
        store.release_claim(claim).unwrap();

        let due = store.find_due(at("2024-03-04T09:00:00Z"), 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, JobStatus::Scheduled);
    }

    #[test]
    fn abandoned_claim_expires_after_lease() {
        let (store, clock) = store_at("2024-03-04T09:00:00Z");
        let store = store.with_claim_lease(Duration::minutes(10));
        let job = store.insert_job(hourly_job("a", "2024-03-04T09:00:00Z")).unwrap();
        let stale = store.try_claim(&job.id, job.next_run).unwrap();

        clock.advance(Duration::minutes(5));
        assert!(store.try_claim(&job.id, job.next_run).is_err());

        clock.advance(Duration::minutes(6));
        let fresh = store.try_claim(&job.id, job.next_run).unwrap();

        // the crashed holder can no longer write
        assert!(store
            .advance_after_run(&stale, advance_to("2024-03-04T10:00:00Z", "2024-03-04T09:11:00Z"))
            .is_err());
        store
            .advance_after_run(&fresh, advance_to("2024-03-04T10:00:00Z", "2024-03-04T09:11:00Z"))
            .unwrap();
    }

    #[test]
    fn inactive_jobs_are_neither_due_nor_claimable() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let job = store.insert_job(hourly_job("a", "2024-03-04T09:00:00Z")).unwrap();
        let paused = store.set_active(&job.id, false).unwrap();
        assert!(!paused.active);
        assert_eq!(paused.status, JobStatus::Deactivated);

        assert!(store.find_due(at("2024-03-04T10:00:00Z"), 10).unwrap().is_empty());
        assert!(store.try_claim(&job.id, job.next_run).is_err());

        let resumed = store.set_active(&job.id, true).unwrap();
        assert!(resumed.active);
        assert_eq!(resumed.status, JobStatus::Scheduled);
    }

    #[test]
    fn remove_unknown_job_is_not_found() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let err = store.remove_job(&JobId::from("nope")).unwrap_err();
        assert!(matches!(err, ScheduleError::JobNotFound { .. }));
    }

    #[test]
    fn once_rule_is_stored_at_whole_seconds() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let mut new = hourly_job("announce", "2024-03-04T09:00:00Z");
        new.start_at = None;
        new.rule = Rule::Once {
            at: at("2024-03-04T10:00:00.500Z"),
        };
        let job = store.insert_job(new).unwrap();

        let stored = store.get_job(&job.id).unwrap();
        assert_eq!(
            stored.rule,
            Rule::Once {
                at: at("2024-03-04T10:00:00Z")
            }
        );
        assert_eq!(stored.next_run, at("2024-03-04T10:00:00Z"));
    }

    #[test]
    fn insert_rejects_invalid_rule() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let mut new = hourly_job("bad", "2024-03-04T09:00:00Z");
        new.rule = Rule::Calendar {
            times_of_day: vec![],
            days_of_week: vec![],
            exclude_month_days: vec![],
        };
        assert!(matches!(
            store.insert_job(new),
            Err(ScheduleError::InvalidRule(_))
        ));
        assert!(store.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn counts_group_by_status() {
        let (store, _) = store_at("2024-03-04T09:00:00Z");
        let a = store.insert_job(hourly_job("a", "2024-03-04T10:00:00Z")).unwrap();
        store.insert_job(hourly_job("b", "2024-03-04T10:00:00Z")).unwrap();
        store.set_active(&a.id, false).unwrap();

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.get("scheduled"), Some(&1));
        assert_eq!(counts.get("deactivated"), Some(&1));
    }
}
