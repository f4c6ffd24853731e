use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autopost_core::JobId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What a content generator is asked to produce for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub job_id: JobId,
    /// Opaque reference to the job's generation config.
    pub payload_ref: String,
    pub variant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_override: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    /// The generator refused the request; retrying will not help.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// External content generation backend.
///
/// Returns a reference to the produced artifact (post id, file path, ...).
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, req: &GenerationRequest) -> Result<String, GeneratorError>;
}

/// Wraps a generator with bounded retries and linear back-off.
///
/// [`GeneratorError::Rejected`] and [`GeneratorError::Cancelled`] are returned
/// immediately. The processor's timeout covers the whole retry sequence.
pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn Generator>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff: Duration::from_millis(500),
        }
    }

    /// Base delay; attempt `n` waits `backoff * n`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String, GeneratorError> {
        let mut last_err: Option<GeneratorError> = None;

        for attempt in 0..=self.max_retries {
            match self.inner.generate(req).await {
                Ok(artifact) => {
                    if attempt > 0 {
                        info!(
                            generator = %self.inner.name(),
                            job_id = %req.job_id,
                            attempt,
                            "generation succeeded after retry"
                        );
                    }
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!(
                        generator = %self.inner.name(),
                        job_id = %req.job_id,
                        attempt,
                        err = %e,
                        "generation attempt failed"
                    );

                    if matches!(e, GeneratorError::Rejected(_) | GeneratorError::Cancelled) {
                        return Err(e);
                    }
                    last_err = Some(e);

                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| GeneratorError::Unavailable("no attempt was made".to_string())))
    }
}
