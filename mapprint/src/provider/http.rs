//! HTTP client abstraction for testability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::ProviderError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for async HTTP GET operations.
///
/// Dyn-compatible (returns a boxed future) so fetch workers can share one
/// `Arc<dyn AsyncHttpClient>` across a job.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an HTTP GET request and returns the response body.
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, ProviderError>> + Send + 'a>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ProviderError::Http(format!("request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response
                .bytes()
                .await
                .map_err(|e| ProviderError::Http(format!("failed to read response: {}", e)))
        })
    }
}

/// Mock HTTP client for tests.
///
/// Answers with the first matching substring rule, falling back to the
/// default response, and records every requested URL. An optional delay
/// simulates slow networks so progress can be observed mid-flight.
pub struct MockHttpClient {
    default: Result<Bytes, ProviderError>,
    rules: Vec<(String, Result<Bytes, ProviderError>)>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    /// Creates a mock answering every request with `body`.
    pub fn new(body: Bytes) -> Self {
        Self {
            default: Ok(body),
            rules: Vec::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock failing every request.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            default: Err(error),
            rules: Vec::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Adds a rule: URLs containing `fragment` get `response` instead of
    /// the default.
    pub fn with_rule(
        mut self,
        fragment: impl Into<String>,
        response: Result<Bytes, ProviderError>,
    ) -> Self {
        self.rules.push((fragment.into(), response));
        self
    }

    /// Delays every response, simulating a slow network.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every URL requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl AsyncHttpClient for MockHttpClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests.lock().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.rules
                .iter()
                .find(|(fragment, _)| url.contains(fragment))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| self.default.clone())
        })
    }
}
