use std::sync::Arc;
use std::time::{Duration, Instant};

use autopost_core::config::SchedulerConfig;
use autopost_core::{JobId, RunId};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, ScheduleError},
    generator::{GenerationRequest, Generator},
    history::{HistoryLog, RunCompletion},
    schedule::{IntervalCalculator, RuleCalculator},
    store::{Advance, ClaimToken, ScheduleStore},
    types::{Job, JobStatus, RunOutcome, RunTrigger},
    variant::{PolicySelector, VariantSelector},
};

/// Tick policy, usually built from [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub batch_size: u32,
    pub max_concurrent_jobs: usize,
    pub max_consecutive_failures: Option<u32>,
    pub generator_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ProcessorConfig {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            max_concurrent_jobs: cfg.max_concurrent_jobs,
            max_consecutive_failures: cfg.max_consecutive_failures,
            generator_timeout: Duration::from_secs(cfg.generator_timeout_secs),
            tick_interval: Duration::from_secs(cfg.tick_interval_secs),
        }
    }
}

/// Per-tick counters returned by [`ScheduleProcessor::run_due_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Jobs another tick claimed first.
    pub conflicts: usize,
    /// Jobs left untouched because their rule is unusable.
    pub invalid: usize,
    /// Jobs left due because a store write failed.
    pub store_failures: usize,
    pub deactivated: usize,
    pub elapsed_ms: u64,
}

/// Lifecycle notifications published to an optional observer channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        job_id: JobId,
        run_id: RunId,
        name: String,
    },
    Succeeded {
        job_id: JobId,
        run_id: RunId,
        variant: String,
        artifact_ref: String,
    },
    Failed {
        job_id: JobId,
        run_id: RunId,
        error: String,
        consecutive_failures: u32,
    },
    Skipped {
        job_id: JobId,
        run_id: RunId,
        reason: String,
    },
    Deactivated {
        job_id: JobId,
        consecutive_failures: u32,
    },
    InvalidRule {
        job_id: JobId,
        error: String,
    },
}

/// Result of a `run-now` request.
#[derive(Debug, Clone, Serialize)]
pub struct ManualRun {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub variant: Option<String>,
    pub artifact_ref: Option<String>,
    pub error_detail: Option<String>,
}

/// How one job left the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobResult {
    Conflict,
    Invalid,
    StoreFailure,
    Ran {
        outcome: RunOutcome,
        deactivated: bool,
    },
}

/// What a single generation attempt produced, before it is persisted.
struct Attempt {
    outcome: RunOutcome,
    variant: Option<String>,
    artifact_ref: Option<String>,
    error_detail: Option<String>,
}

/// Post-run bookkeeping derived from the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settlement {
    consecutive_failures: u32,
    deactivate: bool,
    hit_failure_limit: bool,
    status: JobStatus,
}

fn settle(
    outcome: RunOutcome,
    next_run: Option<DateTime<Utc>>,
    previous_failures: u32,
    max_consecutive_failures: Option<u32>,
) -> Settlement {
    let consecutive_failures = match outcome {
        RunOutcome::Succeeded => 0,
        RunOutcome::Failed => previous_failures.saturating_add(1),
        RunOutcome::Skipped => previous_failures,
    };
    let hit_failure_limit = outcome == RunOutcome::Failed
        && max_consecutive_failures.is_some_and(|max| consecutive_failures >= max);
    let status = match (next_run, hit_failure_limit, outcome) {
        (_, true, _) => JobStatus::Deactivated,
        (None, false, RunOutcome::Succeeded) => JobStatus::Completed,
        (None, false, _) => JobStatus::Failed,
        (Some(_), false, _) => JobStatus::Scheduled,
    };
    Settlement {
        consecutive_failures,
        deactivate: next_run.is_none() || hit_failure_limit,
        hit_failure_limit,
        status,
    }
}

/// Runs due jobs: claim, pick a variant, generate, record, advance.
///
/// Every collaborator is injected, so a tick can be driven entirely by test
/// doubles. One job's failure never affects the rest of the batch.
pub struct ScheduleProcessor {
    config: ProcessorConfig,
    store: Arc<dyn ScheduleStore>,
    history: Arc<dyn HistoryLog>,
    generator: Arc<dyn Generator>,
    calculator: Arc<dyn IntervalCalculator>,
    selector: Arc<dyn VariantSelector>,
    clock: Arc<dyn Clock>,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl ScheduleProcessor {
    pub fn new(
        config: ProcessorConfig,
        store: Arc<dyn ScheduleStore>,
        history: Arc<dyn HistoryLog>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config,
            store,
            history,
            generator,
            calculator: Arc::new(RuleCalculator),
            selector: Arc::new(PolicySelector::new()),
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn IntervalCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn VariantSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish [`RunEvent`]s here. Sends never block; a full channel drops the event.
    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process everything due at the clock's current time.
    pub async fn run_due_jobs(&self) -> Result<TickReport> {
        self.run_due_jobs_at(self.clock.now()).await
    }

    /// Process everything due at `now`.
    ///
    /// Only a failure to read the due list is returned as an error; per-job
    /// problems are logged and counted in the report.
    pub async fn run_due_jobs_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let started = Instant::now();
        let due = self.store.find_due(now, self.config.batch_size)?;

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            debug!("no jobs due");
            return Ok(report);
        }

        let jobs: Vec<_> = due
            .into_iter()
            .map(|job| self.process_job(job, now))
            .collect();
        let results: Vec<JobResult> = stream::iter(jobs)
            .buffer_unordered(self.config.max_concurrent_jobs.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                JobResult::Conflict => report.conflicts += 1,
                JobResult::Invalid => report.invalid += 1,
                JobResult::StoreFailure => {
                    report.claimed += 1;
                    report.store_failures += 1;
                }
                JobResult::Ran {
                    outcome,
                    deactivated,
                } => {
                    report.claimed += 1;
                    match outcome {
                        RunOutcome::Succeeded => report.succeeded += 1,
                        RunOutcome::Failed => report.failed += 1,
                        RunOutcome::Skipped => report.skipped += 1,
                    }
                    if deactivated {
                        report.deactivated += 1;
                    }
                }
            }
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            conflicts = report.conflicts,
            store_failures = report.store_failures,
            elapsed_ms = report.elapsed_ms,
            "tick finished"
        );
        Ok(report)
    }

    /// Generate for `job_id` immediately, outside its schedule.
    ///
    /// The run is recorded with [`RunTrigger::Manual`]. The job's `next_run`,
    /// run count and failure streak are left alone.
    pub async fn run_job_now(&self, job_id: &JobId) -> Result<ManualRun> {
        let job = self.store.get_job(job_id)?;
        let attempted_at = self.clock.now();
        let run_id = self
            .history
            .record_started(&job.id, RunTrigger::Manual, attempted_at)?;
        info!(job_id = %job.id, run_id = %run_id, name = %job.name, "manual run");

        let attempt = self.attempt(&job).await;
        self.history.record_completed(
            &run_id,
            RunCompletion {
                outcome: attempt.outcome,
                completed_at: self.clock.now(),
                variant: attempt.variant.clone(),
                error_detail: attempt.error_detail.clone(),
                artifact_ref: attempt.artifact_ref.clone(),
            },
        )?;

        Ok(ManualRun {
            run_id,
            outcome: attempt.outcome,
            variant: attempt.variant,
            artifact_ref: attempt.artifact_ref,
            error_detail: attempt.error_detail,
        })
    }

    /// Tick on a fixed interval until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "schedule processor started"
        );
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_due_jobs().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("schedule processor shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    async fn process_job(&self, job: Job, now: DateTime<Utc>) -> JobResult {
        if let Err(e) = self.calculator.validate(&job.rule) {
            error!(job_id = %job.id, name = %job.name, "job not run: {e}");
            self.emit(RunEvent::InvalidRule {
                job_id: job.id.clone(),
                error: e.to_string(),
            });
            return JobResult::Invalid;
        }

        let claim = match self.store.try_claim(&job.id, job.next_run) {
            Ok(claim) => claim,
            Err(ScheduleError::ClaimConflict { .. }) => {
                debug!(job_id = %job.id, "already claimed, skipping");
                return JobResult::Conflict;
            }
            Err(e) => {
                error!(job_id = %job.id, "claim failed: {e}");
                return JobResult::StoreFailure;
            }
        };

        // computed before generating so a slow run cannot shift the phase
        let next_run = match self.calculator.next_run(&job.rule, job.next_run, now) {
            Ok(next) => next,
            Err(e) => {
                error!(job_id = %job.id, "cannot compute next run: {e}");
                self.emit(RunEvent::InvalidRule {
                    job_id: job.id.clone(),
                    error: e.to_string(),
                });
                self.release(claim);
                return JobResult::Invalid;
            }
        };

        let run_id = match self
            .history
            .record_started(&job.id, RunTrigger::Scheduled, now)
        {
            Ok(id) => id,
            Err(e) => {
                error!(job_id = %job.id, "cannot record run start: {e}");
                self.release(claim);
                return JobResult::StoreFailure;
            }
        };
        self.emit(RunEvent::Started {
            job_id: job.id.clone(),
            run_id: run_id.clone(),
            name: job.name.clone(),
        });

        let attempt = self.attempt(&job).await;

        if let Err(e) = self.history.record_completed(
            &run_id,
            RunCompletion {
                outcome: attempt.outcome,
                completed_at: self.clock.now(),
                variant: attempt.variant.clone(),
                error_detail: attempt.error_detail.clone(),
                artifact_ref: attempt.artifact_ref.clone(),
            },
        ) {
            // the schedule still advances; the run stays `started` in history
            error!(job_id = %job.id, run_id = %run_id, "cannot record run completion: {e}");
        }

        let settled = settle(
            attempt.outcome,
            next_run,
            job.consecutive_failures,
            self.config.max_consecutive_failures,
        );
        let advance = Advance {
            next_run,
            last_run: now,
            consecutive_failures: settled.consecutive_failures,
            deactivate: settled.deactivate,
            status: settled.status,
        };
        if let Err(e) = self.store.advance_after_run(&claim, advance) {
            error!(job_id = %job.id, "cannot advance schedule, job stays due: {e}");
            self.release(claim);
            return JobResult::StoreFailure;
        }

        self.emit_outcome(&job, &run_id, &attempt, settled.consecutive_failures);
        if settled.hit_failure_limit {
            warn!(
                job_id = %job.id,
                name = %job.name,
                consecutive_failures = settled.consecutive_failures,
                "job deactivated after repeated failures"
            );
            self.emit(RunEvent::Deactivated {
                job_id: job.id.clone(),
                consecutive_failures: settled.consecutive_failures,
            });
        } else if next_run.is_none() {
            info!(job_id = %job.id, status = %settled.status, "one-time job retired");
        } else {
            debug!(job_id = %job.id, next_run = ?next_run, "job advanced");
        }

        JobResult::Ran {
            outcome: attempt.outcome,
            deactivated: settled.hit_failure_limit,
        }
    }

    async fn attempt(&self, job: &Job) -> Attempt {
        let variant = match self.selector.select_variant(job, &job.variant_policy) {
            Ok(variant) => variant,
            Err(e) => {
                warn!(job_id = %job.id, "run skipped: {e}");
                return Attempt {
                    outcome: RunOutcome::Skipped,
                    variant: None,
                    artifact_ref: None,
                    error_detail: Some(e.to_string()),
                };
            }
        };

        let req = GenerationRequest {
            job_id: job.id.clone(),
            payload_ref: job.payload_ref.clone(),
            variant: variant.clone(),
            topic_override: job.topic_override.clone(),
        };
        let timeout = self.config.generator_timeout;
        let result = match tokio::time::timeout(timeout, self.generator.generate(&req)).await {
            Ok(Ok(artifact)) => Ok(artifact),
            Ok(Err(e)) => Err(ScheduleError::GeneratorFailure(e.to_string())),
            Err(_) => Err(ScheduleError::GeneratorFailure(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            ))),
        };

        match result {
            Ok(artifact) => Attempt {
                outcome: RunOutcome::Succeeded,
                variant: Some(variant),
                artifact_ref: Some(artifact),
                error_detail: None,
            },
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    generator = %self.generator.name(),
                    "generation failed: {e}"
                );
                Attempt {
                    outcome: RunOutcome::Failed,
                    variant: Some(variant),
                    artifact_ref: None,
                    error_detail: Some(e.to_string()),
                }
            }
        }
    }

    fn emit_outcome(&self, job: &Job, run_id: &RunId, attempt: &Attempt, failures: u32) {
        let detail = attempt.error_detail.clone().unwrap_or_default();
        let event = match attempt.outcome {
            RunOutcome::Succeeded => RunEvent::Succeeded {
                job_id: job.id.clone(),
                run_id: run_id.clone(),
                variant: attempt.variant.clone().unwrap_or_default(),
                artifact_ref: attempt.artifact_ref.clone().unwrap_or_default(),
            },
            RunOutcome::Failed => RunEvent::Failed {
                job_id: job.id.clone(),
                run_id: run_id.clone(),
                error: detail,
                consecutive_failures: failures,
            },
            RunOutcome::Skipped => RunEvent::Skipped {
                job_id: job.id.clone(),
                run_id: run_id.clone(),
                reason: detail,
            },
        };
        self.emit(event);
    }

    fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.events {
            if tx.try_send(event).is_err() {
                warn!("event channel full or closed, run event dropped");
            }
        }
    }

    fn release(&self, claim: ClaimToken) {
        let job_id = claim.job_id().clone();
        if let Err(e) = self.store.release_claim(claim) {
            // the lease expires on its own
            warn!(job_id = %job_id, "claim release failed: {e}");
        }
    }
}
