use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use autopost_core::{config::AutopostConfig, JobId};
use autopost_scheduler::{
    HistoryLog, IntervalUnit, Job, NewJob, ProcessorConfig, Rule, RunEvent, ScheduleProcessor,
    SqliteHistoryLog, SqliteScheduleStore, TimeOfDay, VariantPolicy, WeightedVariant,
};
use chrono::{DateTime, Utc, Weekday};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::app::{build_router, AppState};
use crate::generator::build_generator;

#[derive(Parser)]
#[command(name = "autopost")]
#[command(author, version, about = "Recurring AI content generation scheduler", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to autopost.toml (falls back to AUTOPOST_CONFIG, then ~/.autopost/autopost.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP trigger and run the built-in tick loop
    Serve {
        /// Only tick when POST /tick is called
        #[arg(long)]
        no_loop: bool,
    },

    /// Run every due job once and exit
    Tick,

    /// Job management
    #[command(subcommand)]
    Jobs(JobCommands),

    /// Generate for a job now without changing its schedule
    RunNow {
        /// Job ID
        id: String,
    },

    /// Show recent runs
    History {
        /// Only runs of this job
        #[arg(long)]
        job: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a job
    Add(AddArgs),

    /// List all jobs
    List,

    /// Jobs due soonest
    Upcoming {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Stop scheduling a job
    Pause { id: String },

    /// Resume a paused or deactivated job
    Resume { id: String },

    /// Delete a job
    Remove { id: String },
}

#[derive(Args, Debug, Default)]
pub struct AddArgs {
    #[arg(long)]
    pub name: String,

    /// Generation config reference handed to the generator (template id etc.)
    #[arg(long)]
    pub payload: String,

    /// Named frequency: hourly, every_4_hours, daily, weekly, bi_weekly, monthly, once, every_<weekday>
    #[arg(long, conflicts_with_all = ["every", "at"])]
    pub preset: Option<String>,

    /// Fixed interval such as 30m, 4h, 2d or 1w
    #[arg(long, conflicts_with = "at")]
    pub every: Option<String>,

    /// Calendar time of day in UTC (HH:MM), repeatable
    #[arg(long)]
    pub at: Vec<String>,

    /// Weekdays for --at, comma separated (mon,wed,fri). Empty means every day
    #[arg(long, value_delimiter = ',', requires = "at")]
    pub days: Vec<String>,

    /// Days of the month (1-31) on which --at never fires, comma separated
    #[arg(long = "skip-days", value_delimiter = ',', requires = "at")]
    pub skip_month_days: Vec<u32>,

    /// Phase anchor and first run, RFC 3339. Defaults to now
    #[arg(long)]
    pub start: Option<String>,

    /// Topic passed to the generator instead of the template's own
    #[arg(long)]
    pub topic: Option<String>,

    /// Variant name, repeatable. Several variants rotate
    #[arg(long = "variant")]
    pub variants: Vec<String>,

    /// How several --variant values rotate
    #[arg(long, value_enum, default_value_t = Rotation::RoundRobin)]
    pub rotation: Rotation,

    /// Weighted variant as name=weight, repeatable. Overrides --variant
    #[arg(long = "weight")]
    pub weights: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Rotation {
    #[default]
    RoundRobin,
    Alternating,
    /// Uniform random pick on every run
    Random,
}

/// Shared store handles opened once per process.
struct Stores {
    store: Arc<SqliteScheduleStore>,
    history: Arc<SqliteHistoryLog>,
}

pub async fn run(command: Commands, config: AutopostConfig) -> anyhow::Result<()> {
    let stores = open_stores(&config)?;

    match command {
        Commands::Serve { no_loop } => serve(config, stores, !no_loop).await,
        Commands::Tick => {
            let processor = build_processor(&config, &stores, None);
            let report = processor.run_due_jobs().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Jobs(cmd) => jobs(cmd, &stores),
        Commands::RunNow { id } => {
            let processor = build_processor(&config, &stores, None);
            let run = processor.run_job_now(&JobId::from(id)).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
            Ok(())
        }
        Commands::History { job, limit } => {
            let job = job.map(JobId::from);
            for record in stores.history.recent(job.as_ref(), limit)? {
                let outcome = record.outcome().map(|o| o.as_str()).unwrap_or("started");
                println!(
                    "{}  {}  {:<9} {:<9} {}{}",
                    record.attempted_at.format("%Y-%m-%d %H:%M:%S"),
                    record.job_id,
                    record.trigger.as_str(),
                    outcome,
                    record.variant.as_deref().unwrap_or("-"),
                    record
                        .error_detail
                        .map(|e| format!("  ({e})"))
                        .unwrap_or_default(),
                );
            }
            Ok(())
        }
    }
}

fn jobs(cmd: JobCommands, stores: &Stores) -> anyhow::Result<()> {
    match cmd {
        JobCommands::Add(args) => {
            let job = stores.store.insert_job(new_job(args, Utc::now())?)?;
            println!("{}", job.id);
            print_job(&job);
        }
        JobCommands::List => {
            let jobs = stores.store.list_jobs()?;
            for job in &jobs {
                print_job(job);
            }
            let counts = stores.store.count_by_status()?;
            let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}: {n}")).collect();
            println!("{} jobs ({})", jobs.len(), summary.join(", "));
        }
        JobCommands::Upcoming { limit } => {
            for job in stores.store.upcoming(limit)? {
                print_job(&job);
            }
        }
        JobCommands::Pause { id } => print_job(&stores.store.set_active(&JobId::from(id), false)?),
        JobCommands::Resume { id } => print_job(&stores.store.set_active(&JobId::from(id), true)?),
        JobCommands::Remove { id } => {
            stores.store.remove_job(&JobId::from(id.clone()))?;
            println!("removed {id}");
        }
    }
    Ok(())
}

fn print_job(job: &Job) {
    let rule = serde_json::to_string(&job.rule).unwrap_or_default();
    println!(
        "{}  {:<24} {:<11} next={} runs={} failures={} rule={}",
        job.id,
        job.name,
        job.status.as_str(),
        job.next_run.format("%Y-%m-%d %H:%M"),
        job.run_count,
        job.consecutive_failures,
        rule,
    );
}

async fn serve(config: AutopostConfig, stores: Stores, run_loop: bool) -> anyhow::Result<()> {
    // Run-event channel: ScheduleProcessor → logging task
    let (events_tx, mut events_rx) = mpsc::channel::<RunEvent>(256);
    let processor = Arc::new(build_processor(&config, &stores, Some(events_tx)));

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            match event {
                RunEvent::Failed { .. } | RunEvent::Deactivated { .. } | RunEvent::InvalidRule { .. } => {
                    warn!(event = %json, "run event")
                }
                _ => info!(event = %json, "run event"),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if run_loop {
        let looping = Arc::clone(&processor);
        tokio::spawn(async move { looping.run(shutdown_rx).await });
    } else {
        info!("built-in tick loop disabled, waiting for POST /tick");
    }

    let addr: SocketAddr = format!("{}:{}", config.trigger.bind, config.trigger.port).parse()?;
    let state = Arc::new(AppState::new(
        config,
        processor,
        stores.store,
        stores.history,
    ));
    let router = build_router(state);

    info!("autopost gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // signal the tick loop to stop
    let _ = shutdown_tx.send(true);
    Ok(())
}

fn open_stores(config: &AutopostConfig) -> anyhow::Result<Stores> {
    config.scheduler.validate()?;
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)
        .with_context(|| format!("cannot open database at {db_path}"))?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    db.busy_timeout(std::time::Duration::from_secs(5))?;
    let conn = Arc::new(Mutex::new(db));

    let lease = chrono::Duration::seconds(config.scheduler.claim_lease_secs as i64);
    let store = SqliteScheduleStore::from_shared(Arc::clone(&conn))?.with_claim_lease(lease);
    let history = SqliteHistoryLog::from_shared(conn)?;
    Ok(Stores {
        store: Arc::new(store),
        history: Arc::new(history),
    })
}

fn build_processor(
    config: &AutopostConfig,
    stores: &Stores,
    events: Option<mpsc::Sender<RunEvent>>,
) -> ScheduleProcessor {
    let processor = ScheduleProcessor::new(
        ProcessorConfig::from(&config.scheduler),
        stores.store.clone(),
        stores.history.clone(),
        build_generator(&config.generator),
    );
    match events {
        Some(tx) => processor.with_events(tx),
        None => processor,
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

// --- argument parsing ------------------------------------------------------

fn new_job(args: AddArgs, now: DateTime<Utc>) -> anyhow::Result<NewJob> {
    let start_at = args
        .start
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("--start is not RFC 3339: {s}"))
        })
        .transpose()?;
    let anchor = start_at.unwrap_or(now);

    let rule = match (&args.preset, &args.every, args.at.is_empty()) {
        (Some(preset), _, _) => Rule::from_preset(preset, anchor)?,
        (None, Some(every), _) => parse_every(every)?,
        (None, None, false) => Rule::Calendar {
            times_of_day: args
                .at
                .iter()
                .map(|t| t.parse::<TimeOfDay>().map_err(|e| anyhow!(e)))
                .collect::<anyhow::Result<_>>()?,
            days_of_week: args
                .days
                .iter()
                .map(|d| {
                    d.parse::<Weekday>()
                        .map_err(|_| anyhow!("unknown weekday: {d}"))
                })
                .collect::<anyhow::Result<_>>()?,
            exclude_month_days: args.skip_month_days.clone(),
        },
        (None, None, true) => bail!("one of --preset, --every or --at is required"),
    };

    Ok(NewJob {
        name: args.name,
        rule,
        start_at,
        topic_override: args.topic,
        variant_policy: variant_policy(&args.variants, args.rotation, &args.weights)?,
        payload_ref: args.payload,
    })
}

/// `30m`, `4h`, `2d`, `1w` → fixed interval.
fn parse_every(raw: &str) -> anyhow::Result<Rule> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("interval needs a unit suffix (m, h, d, w): {raw}"))?;
    let (count, unit) = raw.split_at(split);
    let count: u32 = count
        .parse()
        .with_context(|| format!("bad interval count: {raw}"))?;
    let unit = match unit {
        "m" | "min" => IntervalUnit::Minute,
        "h" => IntervalUnit::Hour,
        "d" => IntervalUnit::Day,
        "w" => IntervalUnit::Week,
        other => bail!("unknown interval unit {other:?}, expected m, h, d or w"),
    };
    Ok(Rule::FixedInterval { unit, count })
}

fn variant_policy(
    variants: &[String],
    rotation: Rotation,
    weights: &[String],
) -> anyhow::Result<VariantPolicy> {
    if !weights.is_empty() {
        let weights = weights
            .iter()
            .map(|w| {
                let (variant, weight) = w
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--weight must be name=weight, got {w}"))?;
                Ok(WeightedVariant {
                    variant: variant.trim().to_string(),
                    weight: weight
                        .trim()
                        .parse()
                        .with_context(|| format!("bad weight in {w}"))?,
                })
            })
            .collect::<anyhow::Result<_>>()?;
        return Ok(VariantPolicy::WeightedRandom { weights });
    }

    Ok(match (variants, rotation) {
        ([], _) => VariantPolicy::Fixed {
            variant: "default".to_string(),
        },
        ([only], _) => VariantPolicy::Fixed {
            variant: only.clone(),
        },
        (many, Rotation::RoundRobin) => VariantPolicy::RoundRobin {
            variants: many.to_vec(),
        },
        (many, Rotation::Alternating) => VariantPolicy::Alternating {
            variants: many.to_vec(),
        },
        (many, Rotation::Random) => VariantPolicy::Random {
            variants: many.to_vec(),
        },
    })
}
