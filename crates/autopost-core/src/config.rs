use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_BATCH_SIZE: u32 = 5; // jobs claimed per tick
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 900;
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GENERATOR_RETRIES: u32 = 2;

/// Top-level config (autopost.toml + AUTOPOST_* env overrides).
///
/// Nested keys are addressed with a double underscore in env vars, e.g.
/// `AUTOPOST_SCHEDULER__BATCH_SIZE=10`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutopostConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tick policy consumed by the schedule processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on due jobs fetched per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Jobs generated in parallel within one tick. 1 means sequential.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Deactivate a job once this many runs in a row have failed.
    /// Unset means jobs are never deactivated for failing.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
    #[serde(default = "default_generator_timeout_secs")]
    pub generator_timeout_secs: u64,
    /// Age after which an unreleased claim is treated as abandoned.
    /// Must be longer than `generator_timeout_secs`.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
    /// Cadence of the built-in trigger loop used by `autopost serve`.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl SchedulerConfig {
    /// Reject settings under which a live run could lose its claim.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.claim_lease_secs <= self.generator_timeout_secs {
            return Err(crate::error::CoreError::Config(format!(
                "scheduler.claim_lease_secs ({}) must exceed scheduler.generator_timeout_secs ({})",
                self.claim_lease_secs, self.generator_timeout_secs
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_consecutive_failures: None,
            generator_timeout_secs: DEFAULT_GENERATOR_TIMEOUT_SECS,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
        }
    }
}

/// Remote content generator reached over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Full URL that receives generation requests. Unset disables generation.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Extra attempts after the first failure before the run counts as failed.
    #[serde(default = "default_generator_retries")]
    pub max_retries: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            max_retries: DEFAULT_GENERATOR_RETRIES,
        }
    }
}

/// Authentication mode for the HTTP tick trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerAuthMode {
    /// HMAC-SHA256 over the raw request body in `X-Autopost-Signature`.
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication. Only for loopback or trusted networks.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_auth_mode")]
    pub auth_mode: TriggerAuthMode,
    /// HMAC signing secret or bearer token value.
    pub secret: Option<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            auth_mode: default_auth_mode(),
            secret: None,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autopost/autopost.db", home)
}
fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}
fn default_max_concurrent_jobs() -> usize {
    1
}
fn default_generator_timeout_secs() -> u64 {
    DEFAULT_GENERATOR_TIMEOUT_SECS
}
fn default_claim_lease_secs() -> u64 {
    DEFAULT_CLAIM_LEASE_SECS
}
fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
fn default_generator_retries() -> u32 {
    DEFAULT_GENERATOR_RETRIES
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_auth_mode() -> TriggerAuthMode {
    TriggerAuthMode::BearerToken
}

impl AutopostConfig {
    /// Load config from a TOML file with AUTOPOST_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.autopost/autopost.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AutopostConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AUTOPOST_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
        config.scheduler.validate()?;

        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autopost/autopost.toml", home)
}
