use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::errors::{ApiError, ApiResult};
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::utils::Metrics;

/// Shared HTTP client for the Vision, Translate and DeepL APIs, with
/// circuit breaker, timeouts, retries and metrics
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> ApiResult<Self> {
        Self::with_limits(
            config.api_timeout(),
            config.max_retries(),
            circuit_breaker,
            metrics,
        )
    }

    pub fn with_limits(
        timeout: Duration,
        max_retries: u32,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let circuit_breaker = circuit_breaker.unwrap_or_else(|| CircuitBreaker::new(metrics.clone()));

        Ok(Self {
            http_client,
            circuit_breaker,
            metrics,
            max_retries,
        })
    }

    /// Underlying client, also used to download page images
    pub fn http(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// POST a JSON body and parse the JSON response.
    ///
    /// Credentials belong in `headers`, never in `url`. Transport errors are
    /// stripped of the URL before they are returned.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> ApiResult<serde_json::Value> {
        if !self.circuit_breaker.allow_request() {
            warn!("Circuit breaker is open, failing fast");
            return Err(ApiError::CircuitOpen);
        }

        let start = Instant::now();
        let result = self.send_with_retries(url, body, headers).await;
        let duration = start.elapsed();

        match result {
            Ok(text) => {
                self.circuit_breaker.record_success();
                if let Some(ref m) = self.metrics {
                    m.record_api_call(true, duration);
                }
                Ok(serde_json::from_str(&text)?)
            }
            Err(e) => {
                // Rejected requests say nothing about API health
                if !e.is_client_error() {
                    self.circuit_breaker.record_failure();
                }
                if let Some(ref m) = self.metrics {
                    m.record_api_call(false, duration);
                }
                Err(e)
            }
        }
    }

    /// Send HTTP request with retries and jitter.
    ///
    /// 429 and 5xx responses and transport errors are retried; any other
    /// status fails immediately.
    async fn send_with_retries(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> ApiResult<String> {
        let mut attempt = 0;

        loop {
            let mut request = self
                .http_client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .text()
                        .await
                        .map_err(|e| ApiError::Http(e.without_url()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let retryable = status == 429 || status >= 500;
                    let error = ApiError::Status { status, body };
                    if !retryable {
                        return Err(error);
                    }
                    error
                }
                Err(e) => ApiError::Http(e.without_url()),
            };

            if attempt >= self.max_retries {
                return Err(error);
            }

            debug!(
                "API request failed: {}. Retrying ({}/{})",
                error,
                attempt + 1,
                self.max_retries
            );
            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }
}

/// Exponential backoff with up to one second of jitter
fn backoff_delay(attempt: u32) -> Duration {
    let base_delay = 2_u64.pow(attempt.min(6));
    let jitter = rand::random::<u64>() % 1000;
    Duration::from_millis(base_delay * 1000 + jitter)
}
