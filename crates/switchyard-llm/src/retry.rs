use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use switchyard_core::config::{ModelConfig, RetryConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

/// Retries failed requests against the primary client, then tries fallbacks in order.
///
/// Only the request is retried. Once a stream is returned, mid-stream errors
/// belong to the caller.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &SwitchyardError) -> bool {
    match e {
        SwitchyardError::LlmRequest(msg) => {
            ["429", "500", "502", "503", "504", "timeout", "connection"]
                .iter()
                .any(|marker| msg.contains(marker))
        }
        SwitchyardError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // 0.8x to 1.2x jitter
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.chat_stream(&config, request.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary model exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.chat_stream(fb_config, request.clone()).await {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| SwitchyardError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyClient {
        failures_left: AtomicUsize,
        calls: Arc<AtomicUsize>,
        error: fn() -> SwitchyardError,
    }

    impl LlmClient for FlakyClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _request: ChatRequest,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    return Err((self.error)());
                }
                let stream = futures::stream::iter(vec![Ok(StreamDelta::TextDelta("ok".into()))]);
                Ok(Box::pin(stream) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&SwitchyardError::LlmRequest("HTTP 503 Service Unavailable".into())));
        assert!(!is_retryable(&SwitchyardError::LlmRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&SwitchyardError::Config("x".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        assert!(calculate_backoff(9, &config) <= Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures_left: AtomicUsize::new(2),
                calls: calls.clone(),
                error: || SwitchyardError::LlmRequest("HTTP 429".into()),
            }),
            vec![],
            fast_retry(),
        );
        let result = client
            .chat_stream(&ModelConfig::new("gpt-5"), ChatRequest::default())
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_falls_back_after_fatal_error() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures_left: AtomicUsize::new(usize::MAX),
                calls: primary_calls.clone(),
                error: || SwitchyardError::LlmRequest("HTTP 401".into()),
            }),
            vec![(
                ModelConfig::new("gpt-4.1-mini"),
                Box::new(FlakyClient {
                    failures_left: AtomicUsize::new(0),
                    calls: fallback_calls.clone(),
                    error: || SwitchyardError::LlmRequest("unused".into()),
                }) as Box<dyn LlmClient>,
            )],
            fast_retry(),
        );
        let result = client
            .chat_stream(&ModelConfig::new("gpt-5"), ChatRequest::default())
            .await;
        assert!(result.is_ok());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }
}
