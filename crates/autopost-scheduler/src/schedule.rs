use chrono::{
    DateTime, Datelike, Duration, NaiveTime, SubsecRound, TimeZone, Timelike, Utc, Weekday,
};

use crate::error::{Result, ScheduleError};
use crate::types::{IntervalUnit, Rule, TimeOfDay};

/// Days scanned by the calendar search, today included. Two months, so a
/// run of excluded month days can always be stepped over.
const CALENDAR_SCAN_DAYS: i64 = 62;

/// Compute the next run for `rule` strictly after `now`.
///
/// `reference` is the job's previous `next_run`. Fixed intervals step from it
/// in whole periods, so a job anchored at `:30` stays at `:30` however late
/// the tick arrives. The result always lies at least one period past
/// `reference`.
///
/// Returns `Ok(None)` when the rule is exhausted (a `Once` job that already
/// ran) and `InvalidRule` when the rule cannot produce any instant.
pub fn compute_next_run(
    rule: &Rule,
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    validate_rule(rule)?;
    match rule {
        Rule::FixedInterval { unit, count } => {
            next_fixed(*unit, *count, reference, now).map(Some)
        }
        Rule::Calendar {
            times_of_day,
            days_of_week,
            exclude_month_days,
        } => next_calendar(
            times_of_day,
            days_of_week,
            exclude_month_days,
            reference.max(now),
        )
        .map(Some),
        Rule::Once { at } => {
            // stored next_run has whole seconds; compare at the same precision
            let at = at.trunc_subsecs(0);
            Ok((at > reference && at > now).then_some(at))
        }
    }
}

/// The first `next_run` for a freshly created job.
///
/// A fixed interval whose anchor is still ahead fires at the anchor itself;
/// an anchor in the past is caught up with its phase intact.
pub fn initial_next_run(
    rule: &Rule,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    validate_rule(rule)?;
    match rule {
        Rule::FixedInterval { unit, count } => {
            if anchor >= now {
                Ok(anchor)
            } else {
                next_fixed(*unit, *count, anchor, now)
            }
        }
        Rule::Calendar {
            times_of_day,
            days_of_week,
            exclude_month_days,
        } => {
            // an instant exactly at `now` is still eligible for a new job
            next_calendar(
                times_of_day,
                days_of_week,
                exclude_month_days,
                now - Duration::seconds(1),
            )
        }
        Rule::Once { at } => Ok(at.trunc_subsecs(0)),
    }
}

/// Reject rules that can never yield a run time.
pub fn validate_rule(rule: &Rule) -> Result<()> {
    match rule {
        Rule::FixedInterval { count: 0, .. } => Err(ScheduleError::InvalidRule(
            "fixed interval count must be at least 1".to_string(),
        )),
        Rule::Calendar { times_of_day, .. } if times_of_day.is_empty() => Err(
            ScheduleError::InvalidRule("calendar rule has no times of day".to_string()),
        ),
        Rule::Calendar {
            exclude_month_days, ..
        } if exclude_month_days.iter().any(|d| !(1..=31).contains(d)) => Err(
            ScheduleError::InvalidRule("excluded month days must be within 1-31".to_string()),
        ),
        Rule::Calendar {
            exclude_month_days, ..
        } if (1..=31).all(|d| exclude_month_days.contains(&d)) => Err(
            ScheduleError::InvalidRule("every day of the month is excluded".to_string()),
        ),
        _ => Ok(()),
    }
}

fn next_fixed(
    unit: IntervalUnit,
    count: u32,
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let period = unit
        .seconds()
        .checked_mul(i64::from(count))
        .ok_or_else(|| ScheduleError::InvalidRule("interval length overflows".to_string()))?;

    // Whole periods already elapsed since the anchor, plus the one in progress.
    let elapsed = (now - reference).num_seconds();
    let steps = if elapsed < 0 { 1 } else { elapsed / period + 1 };

    steps
        .checked_mul(period)
        .and_then(|secs| reference.checked_add_signed(Duration::seconds(secs)))
        .ok_or_else(|| ScheduleError::InvalidRule("next run is out of range".to_string()))
}

fn next_calendar(
    times_of_day: &[TimeOfDay],
    days_of_week: &[Weekday],
    exclude_month_days: &[u32],
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let mut times = times_of_day.to_vec();
    times.sort();
    times.dedup();

    let start = after.date_naive();
    for offset in 0..CALENDAR_SCAN_DAYS {
        let day = start + Duration::days(offset);
        if !days_of_week.is_empty() && !days_of_week.contains(&day.weekday()) {
            continue;
        }
        if exclude_month_days.contains(&day.day()) {
            continue;
        }
        for t in &times {
            let Some(time) = NaiveTime::from_hms_opt(u32::from(t.hour()), u32::from(t.minute()), 0)
            else {
                continue;
            };
            let candidate = Utc.from_utc_datetime(&day.and_time(time));
            if candidate > after {
                return Ok(candidate);
            }
        }
    }

    Err(ScheduleError::InvalidRule(format!(
        "no qualifying time within {CALENDAR_SCAN_DAYS} days"
    )))
}

impl Rule {
    /// The same rule at the whole-second precision the store persists.
    pub fn to_whole_seconds(self) -> Rule {
        match self {
            Rule::Once { at } => Rule::Once {
                at: at.trunc_subsecs(0),
            },
            other => other,
        }
    }

    /// Build a rule from one of the named frequencies offered to operators.
    ///
    /// `every_<weekday>` presets keep the anchor's time of day.
    pub fn from_preset(name: &str, anchor: DateTime<Utc>) -> Result<Rule> {
        let fixed = |unit: IntervalUnit, count: u32| -> Result<Rule> {
            Ok(Rule::FixedInterval { unit, count })
        };
        match name {
            "hourly" => fixed(IntervalUnit::Hour, 1),
            "every_4_hours" => fixed(IntervalUnit::Hour, 4),
            "every_6_hours" => fixed(IntervalUnit::Hour, 6),
            "every_12_hours" => fixed(IntervalUnit::Hour, 12),
            "daily" => fixed(IntervalUnit::Day, 1),
            "weekly" => fixed(IntervalUnit::Week, 1),
            "bi_weekly" => fixed(IntervalUnit::Week, 2),
            "monthly" => fixed(IntervalUnit::Day, 30),
            "once" => Ok(Rule::Once {
                at: anchor.trunc_subsecs(0),
            }),
            other => {
                let day = other
                    .strip_prefix("every_")
                    .and_then(|d| d.parse::<Weekday>().ok())
                    .ok_or_else(|| {
                        ScheduleError::InvalidRule(format!("unknown frequency: {other}"))
                    })?;
                let time = TimeOfDay::new(anchor.hour() as u8, anchor.minute() as u8)
                    .ok_or_else(|| ScheduleError::InvalidRule("bad anchor time".to_string()))?;
                Ok(Rule::Calendar {
                    times_of_day: vec![time],
                    days_of_week: vec![day],
                    exclude_month_days: Vec::new(),
                })
            }
        }
    }
}

/// Next-run computation as an injectable collaborator.
pub trait IntervalCalculator: Send + Sync {
    fn next_run(
        &self,
        rule: &Rule,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    fn validate(&self, rule: &Rule) -> Result<()> {
        validate_rule(rule)
    }
}

/// The default calculator: [`compute_next_run`] with no extra policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCalculator;

impl IntervalCalculator for RuleCalculator {
    fn next_run(
        &self,
        rule: &Rule,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        compute_next_run(rule, reference, now)
    }
}
