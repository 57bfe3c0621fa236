//! Single-shot LLM call with timeout, JSON-mode, validation, retry and
//! fallback model.
//!
//! Call states: PENDING -> IN_FLIGHT -> { VALIDATED | retriable error ->
//! IN_FLIGHT ... | exhausted -> fallback IN_FLIGHT -> { VALIDATED |
//! DEGRADED } }. A validated fallback result is a normal artifact; only a
//! call that never validates terminates DEGRADED.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::errors::CallError;
use crate::keypool::KeyPool;
use crate::providers::llm::{ChatClient, ChatRequest};

#[derive(Debug, Clone)]
pub struct CallSpec {
    pub model: String,
    pub fallback_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl CallSpec {
    pub fn from_config(config: &crate::config::OrchestratorConfig) -> Self {
        Self {
            model: config.model.clone(),
            fallback_model: Some(config.fallback_model.clone())
                .filter(|m| !m.is_empty() && *m != config.model),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.request_timeout,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }
}

// Fallback calls run smaller and cooler than the primary model.
const FALLBACK_MAX_TOKENS: u32 = 800;
const FALLBACK_TEMPERATURE: f32 = 0.5;

#[derive(Debug)]
pub struct CallOutcome<T> {
    pub artifact: T,
    pub degraded: bool,
    /// Model that produced the artifact (the fallback model if the
    /// primary was exhausted).
    pub model: String,
    pub fallback_model: Option<String>,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub latency_ms: i64,
    pub attempt_count: i64,
    pub finish_reason: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

pub struct CallRunner {
    pool: Arc<KeyPool>,
    client: Arc<dyn ChatClient>,
}

impl CallRunner {
    pub fn new(pool: Arc<KeyPool>, client: Arc<dyn ChatClient>) -> Self {
        Self { pool, client }
    }

    /// Execute one constrained-JSON generation. `validate` parses and
    /// checks the raw response text; `degraded` supplies the terminal
    /// placeholder when nothing ever validates.
    pub async fn run<T>(
        &self,
        prompt: &str,
        spec: &CallSpec,
        validate: impl Fn(&str) -> Result<T, CallError>,
        degraded: impl FnOnce() -> T,
    ) -> CallOutcome<T> {
        let started = Instant::now();
        let mut attempt_count: i64 = 0;
        let mut last_error: Option<CallError> = None;

        for attempt in 0..spec.max_retries.max(1) {
            if attempt > 0 {
                let backoff = spec.retry_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            match self
                .attempt(prompt, &spec.model, spec.max_tokens, spec.temperature, spec, &validate)
                .await
            {
                Ok((artifact, resp_meta)) => {
                    attempt_count += 1;
                    return self.validated(
                        artifact,
                        resp_meta,
                        spec.model.clone(),
                        None,
                        attempt_count,
                        started,
                    );
                }
                Err(AttemptError::NoCredential) => {
                    tracing::error!("no credential available, stopping retries");
                    last_error = Some(CallError::NoCredentialAvailable);
                    break;
                }
                Err(AttemptError::Failed(e)) => {
                    attempt_count += 1;
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = spec.max_retries,
                        error = %e,
                        "call attempt failed"
                    );
                    let retriable = e.is_retriable();
                    last_error = Some(e);
                    if !retriable {
                        break;
                    }
                }
            }
        }

        // One shot with the fallback model, unless the pool is empty.
        if let Some(fallback) = spec
            .fallback_model
            .as_ref()
            .filter(|_| !matches!(last_error, Some(CallError::NoCredentialAvailable)))
        {
            tracing::info!(model = %fallback, "retries exhausted, trying fallback model");
            match self
                .attempt(prompt, fallback, FALLBACK_MAX_TOKENS, FALLBACK_TEMPERATURE, spec, &validate)
                .await
            {
                Ok((artifact, resp_meta)) => {
                    attempt_count += 1;
                    return self.validated(
                        artifact,
                        resp_meta,
                        fallback.clone(),
                        Some(fallback.clone()),
                        attempt_count,
                        started,
                    );
                }
                Err(AttemptError::NoCredential) => {
                    last_error = Some(CallError::NoCredentialAvailable);
                }
                Err(AttemptError::Failed(e)) => {
                    attempt_count += 1;
                    tracing::error!(error = %e, "fallback model also failed");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or(CallError::Other("no attempts executed".into()));
        tracing::error!(error = %error, "all attempts exhausted, emitting degraded artifact");
        CallOutcome {
            artifact: degraded(),
            degraded: true,
            model: spec.model.clone(),
            fallback_model: spec.fallback_model.clone(),
            tokens_prompt: 0,
            tokens_completion: 0,
            latency_ms: started.elapsed().as_millis() as i64,
            attempt_count,
            finish_reason: None,
            error_code: Some(error.kind().as_str().to_string()),
            error_message: Some(error.to_string()),
        }
    }

    async fn attempt<T>(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        spec: &CallSpec,
        validate: &impl Fn(&str) -> Result<T, CallError>,
    ) -> Result<(T, ResponseMeta), AttemptError> {
        let key = match self.pool.acquire().await {
            Ok(key) => key,
            Err(CallError::NoCredentialAvailable) => return Err(AttemptError::NoCredential),
            Err(e) => return Err(AttemptError::Failed(e)),
        };

        let req = ChatRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
        };

        let result = match timeout(spec.timeout, self.client.complete(&key.plaintext, &req)).await
        {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout {
                seconds: spec.timeout.as_secs(),
            }),
        };

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.pool.record_failure(&key.id, &e);
                return Err(AttemptError::Failed(e));
            }
        };

        match validate(&resp.text) {
            Ok(artifact) => {
                self.pool.record_success(&key.id);
                Ok((
                    artifact,
                    ResponseMeta {
                        tokens_prompt: resp.tokens_prompt,
                        tokens_completion: resp.tokens_completion,
                        finish_reason: resp.finish_reason,
                    },
                ))
            }
            Err(e) => {
                self.pool.record_failure(&key.id, &e);
                Err(AttemptError::Failed(e))
            }
        }
    }

    fn validated<T>(
        &self,
        artifact: T,
        meta: ResponseMeta,
        model: String,
        fallback_model: Option<String>,
        attempt_count: i64,
        started: Instant,
    ) -> CallOutcome<T> {
        CallOutcome {
            artifact,
            degraded: false,
            model,
            fallback_model,
            tokens_prompt: meta.tokens_prompt,
            tokens_completion: meta.tokens_completion,
            latency_ms: started.elapsed().as_millis() as i64,
            attempt_count,
            finish_reason: meta.finish_reason,
            error_code: None,
            error_message: None,
        }
    }
}

struct ResponseMeta {
    tokens_prompt: i64,
    tokens_completion: i64,
    finish_reason: Option<String>,
}

enum AttemptError {
    NoCredential,
    Failed(CallError),
}
