use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tracing::{debug, error, warn};

use crate::error::FetchError;
use crate::record::SourceTag;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Html,
}

/// One pending request, produced by a source's discovery step.
#[derive(Debug, Clone)]
pub struct FetchUnit {
    pub source: SourceTag,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub content: ContentKind,
    /// League name, player id, page name; shows up in logs.
    pub label: String,
}

impl FetchUnit {
    pub fn html(source: SourceTag, url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
            headers: Vec::new(),
            content: ContentKind::Html,
            label: label.into(),
        }
    }

    pub fn json(
        source: SourceTag,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source,
            url: url.into(),
            headers,
            content: ContentKind::Json,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Html(String),
}

/// Raw HTTP answer before any status handling.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The network seam. `HttpTransport` talks to the world; tests plug in stubs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn random_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse> {
        let mut req = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_agent());
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    /// Multiplied by the 429 count.
    pub rate_limit_unit: Duration,
    /// Multiplied by the transient failure count.
    pub retry_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
            rate_limit_unit: Duration::from_secs(60),
            retry_unit: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after the `n`th 429 (1-based).
    pub fn rate_limit_delay(&self, n: u32) -> Duration {
        self.rate_limit_unit * n
    }

    /// Wait before retrying after the `n`th transient failure (1-based).
    pub fn retry_delay(&self, n: u32) -> Duration {
        self.retry_unit * n
    }
}

/// Per-run HTTP handle shared by every source.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn fetch(&self, unit: &FetchUnit) -> Result<Payload, FetchError> {
        let mut failures = 0u32;
        let mut throttles = 0u32;
        let mut last_status = None;
        let mut last_error = String::new();

        loop {
            let attempt = failures + throttles + 1;
            let start = Instant::now();
            let outcome = tokio::time::timeout(
                self.policy.timeout,
                self.transport.get(&unit.url, &unit.headers),
            )
            .await;

            match outcome {
                Ok(Ok(resp)) if (200..300).contains(&resp.status) => {
                    debug!(
                        source = %unit.source,
                        url = %unit.url,
                        attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "fetched"
                    );
                    return decode(unit, resp.body);
                }
                Ok(Ok(resp)) if resp.status == 429 => {
                    throttles += 1;
                    if throttles > self.policy.max_retries {
                        error!(url = %unit.url, attempts = attempt, "Rate limit never lifted, giving up");
                        return Err(FetchError::RateLimited {
                            url: unit.url.clone(),
                            attempts: attempt,
                        });
                    }
                    let wait = self.policy.rate_limit_delay(throttles);
                    warn!(
                        "Rate limit hit on {} ({}), waiting {:.1}s before retry",
                        unit.label,
                        unit.url,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(Ok(resp)) => {
                    last_status = Some(resp.status);
                    last_error = format!("HTTP {}", resp.status);
                }
                Ok(Err(e)) => {
                    last_status = None;
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_status = None;
                    last_error = format!("timed out after {:.1}s", self.policy.timeout.as_secs_f64());
                }
            }

            failures += 1;
            if failures > self.policy.max_retries {
                error!(
                    url = %unit.url,
                    attempts = attempt,
                    error = %last_error,
                    "Fetch exhausted retries"
                );
                return Err(FetchError::Unavailable {
                    url: unit.url.clone(),
                    attempts: attempt,
                    status: last_status,
                    last_error,
                });
            }

            let wait = self.policy.retry_delay(failures);
            warn!(
                "Request for {} failed ({}), attempt {}/{}, backing off {:.1}s",
                unit.label,
                last_error,
                failures,
                self.policy.max_retries + 1,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }
}

fn decode(unit: &FetchUnit, body: String) -> Result<Payload, FetchError> {
    match unit.content {
        ContentKind::Html => Ok(Payload::Html(body)),
        ContentKind::Json => serde_json::from_str(&body)
            .map(Payload::Json)
            .map_err(|e| FetchError::Malformed {
                url: unit.url.clone(),
                reason: e.to_string(),
            }),
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::testing::{fast_policy, StubTransport};
    use super::*;

    fn unit(url: &str, content: ContentKind) -> FetchUnit {
        FetchUnit {
            source: SourceTag::RestApi,
            url: url.to_string(),
            headers: vec![("x-apisports-key".into(), "k".into())],
            content,
            label: "test".into(),
        }
    }

    #[test]
    fn rate_limit_backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..=4).map(|n| policy.rate_limit_delay(n).as_secs()).collect();
        assert_eq!(waits, vec![60, 120, 180, 240]);
        assert!(waits.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(policy.retry_delay(2).as_secs(), 20);
    }

    #[tokio::test]
    async fn json_payload_on_success() {
        let stub = Arc::new(StubTransport::new().route("http://a/ok", 200, r#"{"response":[]}"#));
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let payload = fetcher.fetch(&unit("http://a/ok", ContentKind::Json)).await.unwrap();
        assert!(matches!(payload, Payload::Json(v) if v["response"].is_array()));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn retries_through_rate_limit_without_spending_failure_budget() {
        let stub = StubTransport::new()
            .route("http://a/busy", 429, "")
            .route("http://a/busy", 500, "")
            .route("http://a/busy", 429, "")
            .route("http://a/busy", 503, "")
            .route("http://a/busy", 429, "")
            .route("http://a/busy", 502, "")
            .route("http://a/busy", 200, "<html></html>");
        let stub = Arc::new(stub);
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let payload = fetcher.fetch(&unit("http://a/busy", ContentKind::Html)).await.unwrap();
        assert!(matches!(payload, Payload::Html(_)));
        assert_eq!(stub.calls(), 7);
    }

    #[tokio::test]
    async fn persistent_429_ends_rate_limited() {
        let stub = Arc::new(StubTransport::new().route("http://a/slow", 429, ""));
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let err = fetcher.fetch(&unit("http://a/slow", ContentKind::Json)).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { attempts: 4, .. }));
        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn server_errors_exhaust_into_unavailable() {
        let stub = Arc::new(StubTransport::new().route("http://a/down", 503, ""));
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let err = fetcher.fetch(&unit("http://a/down", ContentKind::Json)).await.unwrap_err();
        match err {
            FetchError::Unavailable { attempts, status, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_errors_keep_last_message() {
        let stub = Arc::new(StubTransport::new());
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let err = fetcher.fetch(&unit("http://nowhere", ContentKind::Html)).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.url(), "http://nowhere");
        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn bad_json_is_malformed_and_not_retried() {
        let stub = Arc::new(StubTransport::new().route("http://a/bad", 200, "{not json"));
        let fetcher = Fetcher::new(stub.clone(), fast_policy());
        let err = fetcher.fetch(&unit("http://a/bad", ContentKind::Json)).await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert_eq!(stub.calls(), 1);
    }

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn get(&self, _url: &str, _headers: &[(String, String)]) -> Result<RawResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RawResponse { status: 200, body: String::new() })
        }
    }

    #[tokio::test]
    async fn timeout_counts_as_transient_failure() {
        let policy = RetryPolicy {
            max_retries: 1,
            timeout: Duration::from_millis(5),
            ..fast_policy()
        };
        let fetcher = Fetcher::new(Arc::new(Stalled), policy);
        let err = fetcher.fetch(&unit("http://a/stall", ContentKind::Html)).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { attempts: 2, status: None, .. }));
        assert!(err.to_string().contains("timed out"));
    }

    /// Answers 503 once, then drops every later connection.
    struct ResetAfterOutage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ResetAfterOutage {
        async fn get(&self, _url: &str, _headers: &[(String, String)]) -> Result<RawResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(RawResponse { status: 503, body: String::new() });
            }
            Err(anyhow::anyhow!("connection reset by peer"))
        }
    }

    #[tokio::test]
    async fn status_does_not_outlive_a_later_transport_error() {
        let transport = Arc::new(ResetAfterOutage { calls: AtomicUsize::new(0) });
        let fetcher = Fetcher::new(transport, fast_policy());
        let err = fetcher.fetch(&unit("http://a/flaky", ContentKind::Html)).await.unwrap_err();
        match err {
            FetchError::Unavailable { attempts, status, last_error, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(status, None);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_scale_with_429_count_only() {
        // the leading 503 shifts attempt numbers but not the 429 count
        let stub = StubTransport::new()
            .route("http://a/throttled", 503, "")
            .route("http://a/throttled", 429, "")
            .route("http://a/throttled", 429, "")
            .route("http://a/throttled", 429, "")
            .route("http://a/throttled", 200, "<html></html>");
        let fetcher = Fetcher::new(Arc::new(stub), RetryPolicy::default());

        let start = tokio::time::Instant::now();
        fetcher.fetch(&unit("http://a/throttled", ContentKind::Html)).await.unwrap();
        let elapsed = start.elapsed();

        // 10 s for the 503, then 60 s × (1 + 2 + 3)
        assert!(elapsed >= Duration::from_secs(370), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(371), "waited {elapsed:?}");
    }
}
