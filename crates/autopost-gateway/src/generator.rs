use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autopost_core::config::GeneratorConfig;
use autopost_scheduler::{GenerationRequest, Generator, GeneratorError, RetryingGenerator};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Generator reached over HTTP: POSTs the request as JSON and expects
/// `{"artifact": "<ref>"}` back.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    artifact: String,
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String, GeneratorError> {
        debug!(job_id = %req.job_id, variant = %req.variant, "sending generation request");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(req);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            // connection problems are worth retrying; anything else is reported as-is
            if e.is_connect() || e.is_timeout() {
                GeneratorError::Unavailable(e.to_string())
            } else {
                GeneratorError::Api {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "generator API error");
            return Err(match status.as_u16() {
                400 | 422 => GeneratorError::Rejected(text),
                code => GeneratorError::Api {
                    status: code,
                    message: text,
                },
            });
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GeneratorError::Parse(e.to_string()))?;
        Ok(body.artifact)
    }
}

/// Placeholder when no generator endpoint is configured.
struct NullGenerator;

#[async_trait]
impl Generator for NullGenerator {
    fn name(&self) -> &str {
        "null"
    }

    async fn generate(&self, _req: &GenerationRequest) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unavailable(
            "no generator configured, set generator.endpoint in autopost.toml".into(),
        ))
    }
}

/// Build the generator chain from config.
pub fn build_generator(config: &GeneratorConfig) -> Arc<dyn Generator> {
    match config.endpoint {
        Some(ref endpoint) => {
            info!(
                endpoint = %endpoint,
                retries = config.max_retries,
                "generator: HTTP"
            );
            let http = Arc::new(HttpGenerator::new(endpoint.clone(), config.api_key.clone()));
            Arc::new(
                RetryingGenerator::new(http, config.max_retries)
                    .with_backoff(Duration::from_millis(500)),
            )
        }
        None => {
            warn!("no generator endpoint configured, every run will fail");
            Arc::new(NullGenerator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopost_core::JobId;

    fn request() -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::from("job-1"),
            payload_ref: "template:1".to_string(),
            variant: "default".to_string(),
            topic_override: None,
        }
    }

    #[tokio::test]
    async fn missing_endpoint_yields_unavailable() {
        let gen = build_generator(&GeneratorConfig {
            endpoint: None,
            api_key: None,
            max_retries: 0,
        });
        assert_eq!(gen.name(), "null");
        assert!(matches!(
            gen.generate(&request()).await,
            Err(GeneratorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        // port 9 (discard) is closed on test machines
        let gen = HttpGenerator::new("http://127.0.0.1:9/generate".to_string(), None);
        assert!(matches!(
            gen.generate(&request()).await,
            Err(GeneratorError::Unavailable(_))
        ));
    }

    #[test]
    fn request_body_omits_absent_topic() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["variant"], "default");
        assert!(json.get("topic_override").is_none());
    }
}
