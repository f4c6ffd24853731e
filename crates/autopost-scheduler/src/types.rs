use std::fmt;
use std::str::FromStr;

use autopost_core::{JobId, RunId};
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Length of one [`Rule::FixedInterval`] step before multiplying by `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl IntervalUnit {
    pub fn seconds(self) -> i64 {
        match self {
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3_600,
            IntervalUnit::Day => 86_400,
            IntervalUnit::Week => 604_800,
        }
    }
}

/// Wall-clock time of day in UTC, written as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("time of day must be HH:MM, got {s:?}"))?;
        let hour: u8 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u8 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("time of day out of range: {s:?}"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// Recurrence rule stored with every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Every `count` × `unit`, phase-locked to the job's anchor.
    FixedInterval { unit: IntervalUnit, count: u32 },

    /// At each listed time of day on the allowed weekdays (empty = every day).
    Calendar {
        times_of_day: Vec<TimeOfDay>,
        #[serde(default)]
        days_of_week: Vec<Weekday>,
        /// Days of the month (1-31) on which no slot fires.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude_month_days: Vec<u32>,
    },

    /// A single run at the given UTC instant.
    Once { at: DateTime<Utc> },
}

/// Lifecycle state shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_run time.
    Scheduled,
    /// Claimed by a tick and currently generating.
    Running,
    /// A one-time job that ran successfully and was retired.
    Completed,
    /// A one-time job whose only run failed.
    Failed,
    /// Retired after too many consecutive failures.
    Deactivated,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobStatus::Scheduled),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "deactivated" => Ok(JobStatus::Deactivated),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// One entry of a [`VariantPolicy::WeightedRandom`] table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedVariant {
    pub variant: String,
    /// Relative weight. Entries at or below zero are never picked.
    pub weight: f64,
}

/// How a claimed job picks the configuration variant for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantPolicy {
    Fixed { variant: String },
    /// Cycle through `variants` in order, keyed by the job's run count.
    RoundRobin { variants: Vec<String> },
    /// Alternate between the first two entries of `variants`.
    Alternating { variants: Vec<String> },
    WeightedRandom { weights: Vec<WeightedVariant> },
    /// Uniform pick among `variants` on every run.
    Random { variants: Vec<String> },
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub rule: Rule,
    /// Next instant the job is eligible to run.
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub active: bool,
    pub status: JobStatus,
    pub topic_override: Option<String>,
    pub variant_policy: VariantPolicy,
    /// Opaque generation config reference (template id etc.), passed through.
    pub payload_ref: String,
    /// Completed scheduled attempts, whatever their outcome.
    pub run_count: u32,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub rule: Rule,
    /// Phase anchor for fixed intervals. Defaults to the insertion time.
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topic_override: Option<String>,
    pub variant_policy: VariantPolicy,
    pub payload_ref: String,
}

/// Final outcome of a claimed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    /// Claimed but the generator was never called (e.g. no eligible variant).
    Skipped,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::Skipped => "skipped",
        }
    }
}

impl FromStr for RunOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(RunOutcome::Succeeded),
            "failed" => Ok(RunOutcome::Failed),
            "skipped" => Ok(RunOutcome::Skipped),
            other => Err(format!("unknown run outcome: {other}")),
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

impl FromStr for RunTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RunTrigger::Scheduled),
            "manual" => Ok(RunTrigger::Manual),
            other => Err(format!("unknown run trigger: {other}")),
        }
    }
}

/// The two states a run record passes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Started,
    Completed {
        outcome: RunOutcome,
        completed_at: DateTime<Utc>,
    },
}

/// One row of the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub job_id: JobId,
    pub trigger: RunTrigger,
    pub attempted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RunState,
    pub variant: Option<String>,
    pub error_detail: Option<String>,
    /// Reference to what the generator produced, e.g. a post id.
    pub artifact_ref: Option<String>,
}

impl RunRecord {
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.state {
            RunState::Started => None,
            RunState::Completed { outcome, .. } => Some(outcome),
        }
    }
}
