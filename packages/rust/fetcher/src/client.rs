//! Rate-limited, retrying document fetcher.
//!
//! A fetch never fails past this boundary: every outcome, including exhausted
//! retries, comes back as a [`FetchOutcome`] so the caller can move on to the
//! next source.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use regwatch_shared::{RegwatchError, Result, ScrapingConfig, Source};

use crate::extract::{extract_text, fingerprint};
use crate::limiter::RateLimiter;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Cap on the backoff exponent so long retry chains cannot overflow.
const MAX_BACKOFF_SHIFT: u32 = 16;

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of fetching one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Normalized text and its SHA-256 fingerprint.
    Success { content: String, fingerprint: String },
    /// Human-readable reason the fetch failed after all attempts.
    Error { message: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Classification of one failed attempt.
enum AttemptError {
    /// Worth another try (transport failure, timeout, 429, 5xx).
    Transient(String),
    /// Retrying cannot help (4xx other than 429).
    Permanent(String),
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher with a shared rate limit and bounded exponential backoff.
pub struct Fetcher {
    config: ScrapingConfig,
    client: Client,
    limiter: RateLimiter,
}

impl Fetcher {
    /// Create a fetcher that paces its requests through `limiter`.
    pub fn new(config: ScrapingConfig, limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RegwatchError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    /// Create a fetcher whose limiter starts empty at `config.rate_limit_ms`.
    pub fn from_config(config: ScrapingConfig) -> Result<Self> {
        let limiter = RateLimiter::new(Duration::from_millis(config.rate_limit_ms));
        Self::new(config, limiter)
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch a source and reduce it to normalized text.
    #[instrument(skip_all, fields(source_id = %source.id, url = %source.url))]
    pub async fn fetch(&self, source: &Source) -> FetchOutcome {
        let url = match parse_locator(&source.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "refusing to fetch source");
                return FetchOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        self.limiter.wait().await;
        let result = self.fetch_with_retry(&url).await;
        self.limiter.mark().await;

        match result {
            Ok(html) => {
                let content = extract_text(&html);
                let fingerprint = fingerprint(&content);
                if content.is_empty() {
                    warn!("fetched document has no extractable text");
                }
                info!(
                    chars = content.len(),
                    fingerprint = &fingerprint[..16],
                    "fetched source"
                );
                FetchOutcome::Success {
                    content,
                    fingerprint,
                }
            }
            Err(e) => {
                warn!(error = %e, "fetch failed");
                FetchOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.backoff(attempt - 1);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Permanent(message)) => {
                    return Err(RegwatchError::Fetch(message));
                }
                Err(AttemptError::Transient(message)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %message,
                        "fetch attempt failed"
                    );
                    last_error = message;
                }
            }
        }

        Err(RegwatchError::Fetch(format!(
            "{last_error} (gave up after {attempts} attempts)"
        )))
    }

    /// Delay after the `retry`-th failure (0-based): `retry_backoff_ms * 2^retry`.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(MAX_BACKOFF_SHIFT);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    async fn attempt(&self, url: &Url) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url.as_str())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AttemptError::Transient(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Permanent(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("{url}: body read failed: {e}")))
    }
}

/// Only absolute http(s) locators are fetched.
fn parse_locator(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| RegwatchError::Fetch(format!("invalid locator '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RegwatchError::Fetch(format!(
            "unsupported scheme '{other}' in '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <nav>Home | About</nav>
        <main><h1>Scheme Rules</h1><p>Rule 5.1 applies.</p></main>
    </body></html>"#;

    fn source(url: &str) -> Source {
        Source {
            id: "src-1".into(),
            name: "Scheme Rules".into(),
            url: url.into(),
            kind: "scheme_rules".into(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fast_config() -> ScrapingConfig {
        ScrapingConfig {
            timeout_secs: 5,
            rate_limit_ms: 0,
            max_retries: 3,
            retry_backoff_ms: 10,
            ..ScrapingConfig::default()
        }
    }

    #[tokio::test]
    async fn fetch_extracts_and_fingerprints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::from_config(fast_config()).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/rules", server.uri())))
            .await;

        assert_eq!(
            outcome,
            FetchOutcome::Success {
                content: "Scheme Rules\nRule 5.1 applies.".into(),
                fingerprint: fingerprint("Scheme Rules\nRule 5.1 applies."),
            }
        );
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .with_priority(2)
            .mount(&server)
            .await;

        let fetcher = Fetcher::from_config(fast_config()).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/flaky", server.uri())))
            .await;
        assert!(outcome.is_success(), "got {outcome:?}");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = Fetcher::from_config(fast_config()).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/down", server.uri())))
            .await;

        match outcome {
            FetchOutcome::Error { message } => {
                assert!(message.contains("500"), "message: {message}");
                assert!(message.contains("3 attempts"), "message: {message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::from_config(fast_config()).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/gone", server.uri())))
            .await;
        assert!(matches!(outcome, FetchOutcome::Error { ref message } if message.contains("404")));
    }

    #[tokio::test]
    async fn rate_limited_responses_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .with_priority(2)
            .mount(&server)
            .await;

        let fetcher = Fetcher::from_config(fast_config()).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/busy", server.uri())))
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn slow_origin_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PAGE)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = ScrapingConfig {
            timeout_secs: 1,
            max_retries: 1,
            ..fast_config()
        };
        let fetcher = Fetcher::from_config(config).unwrap();
        let outcome = fetcher
            .fetch(&source(&format!("{}/slow", server.uri())))
            .await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn non_http_locators_fail_without_a_request() {
        let fetcher = Fetcher::from_config(fast_config()).unwrap();

        let outcome = fetcher.fetch(&source("file:///etc/passwd")).await;
        assert!(
            matches!(outcome, FetchOutcome::Error { ref message } if message.contains("unsupported scheme"))
        );

        let outcome = fetcher.fetch(&source("not a url")).await;
        assert!(!outcome.is_success());
        assert!(fetcher.limiter().last_request().await.is_none());
    }

    #[tokio::test]
    async fn consecutive_fetches_respect_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(2)
            .mount(&server)
            .await;

        let config = ScrapingConfig {
            rate_limit_ms: 300,
            ..fast_config()
        };
        let fetcher = Fetcher::from_config(config).unwrap();
        assert_eq!(fetcher.limiter().min_interval(), Duration::from_millis(300));

        let start = std::time::Instant::now();
        fetcher.fetch(&source(&format!("{}/a", server.uri()))).await;
        let first_done = start.elapsed();
        fetcher.fetch(&source(&format!("{}/b", server.uri()))).await;

        assert!(start.elapsed() >= first_done + Duration::from_millis(300));
    }

    #[tokio::test]
    async fn backoff_doubles_per_retry() {
        let config = ScrapingConfig {
            retry_backoff_ms: 1000,
            ..ScrapingConfig::default()
        };
        let fetcher = Fetcher::new(config, RateLimiter::disabled()).unwrap();
        assert_eq!(fetcher.backoff(0), Duration::from_secs(1));
        assert_eq!(fetcher.backoff(1), Duration::from_secs(2));
        assert_eq!(fetcher.backoff(2), Duration::from_secs(4));
    }
}
