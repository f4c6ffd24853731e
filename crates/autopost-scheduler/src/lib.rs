//! `autopost-scheduler`: recurring content-generation jobs with SQLite persistence.
//!
//! # Overview
//!
//! Jobs live in a SQLite `jobs` table. Each call to
//! [`processor::ScheduleProcessor::run_due_jobs`] reads the due jobs, claims
//! each one with a conditional `UPDATE`, picks a variant, calls the
//! [`generator::Generator`] and then advances `next_run` in the same write
//! that releases the claim. Overlapping ticks therefore never run a job
//! twice for the same slot.
//!
//! # Rule kinds
//!
//! | Kind             | Behaviour                                              |
//! |------------------|--------------------------------------------------------|
//! | `fixed_interval` | Every N minutes/hours/days/weeks, phase-locked         |
//! | `calendar`       | At listed HH:MM UTC times, optionally on some weekdays |
//! |                  | and never on excluded days of the month                |
//! | `once`           | Single run at an absolute UTC instant, then retired    |

pub mod clock;
pub mod db;
pub mod error;
pub mod generator;
pub mod history;
pub mod processor;
pub mod schedule;
pub mod store;
pub mod types;
pub mod variant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, ScheduleError};
pub use generator::{GenerationRequest, Generator, GeneratorError, RetryingGenerator};
pub use history::{HistoryLog, RunCompletion, SqliteHistoryLog};
pub use processor::{ManualRun, ProcessorConfig, RunEvent, ScheduleProcessor, TickReport};
pub use schedule::{compute_next_run, IntervalCalculator, RuleCalculator};
pub use store::{Advance, ClaimToken, ScheduleStore, SqliteScheduleStore};
pub use types::{
    IntervalUnit, Job, JobStatus, NewJob, Rule, RunOutcome, RunRecord, RunState, RunTrigger,
    TimeOfDay, VariantPolicy, WeightedVariant,
};
pub use variant::{PolicySelector, VariantSelector};
