use crate::config::Config;
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Retry behavior for one logical GET.
/// The export engine passes this through to the transport unmodified.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter: base * 2^attempt, capped at max_delay.
    /// A server-provided Retry-After always wins.
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(d) = retry_after {
            return d;
        }
        let base = self.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(5));
        let cap = exp.min(self.max_delay.as_millis() as u64).max(1);
        let jitter = fastrand::u64(0..=cap / 2);
        Duration::from_millis(cap / 2 + jitter)
    }
}

/// Transport-level failure. Variants that saw an HTTP response carry its
/// headers so the caller can refresh rate-limit state before re-raising.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned {status}: {message}")]
    Status {
        url: String,
        status: StatusCode,
        message: String,
        headers: Box<HeaderMap>,
    },
    #[error("GET {url} returned a non-JSON body: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
        headers: Box<HeaderMap>,
    },
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl TransportError {
    pub fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Status { headers, .. } | Self::Decode { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

/// A successful JSON GET: the raw body plus the response headers.
#[derive(Debug)]
pub struct JsonResponse {
    pub body: serde_json::Value,
    pub headers: HeaderMap,
}

pub fn build_client(cfg: &Config) -> Result<Client, TransportError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&cfg.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("helpdesk-export")),
    );
    // Authorization header is injected per request to allow token rotation later.
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(TransportError::Build)
}

fn auth_header(token: &str) -> HeaderValue {
    let mut v = HeaderValue::from_str(&format!("Bearer {}", token))
        .unwrap_or_else(|_| HeaderValue::from_static(""));
    v.set_sensitive(true);
    v
}

/// Build an endpoint URL with percent-encoded query pairs. Cursors are opaque
/// server strings and must round-trip through the query untouched.
pub fn build_url(endpoint: &str, params: &[(&str, String)]) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in params {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

fn retry_after_duration(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// One JSON GET with bounded retry on request errors, 429 and 5xx.
/// Other statuses fail immediately; the last 429/5xx after retries are
/// exhausted fails with its headers attached.
pub async fn get_json(
    client: &Client,
    cfg: &Config,
    url: &Url,
    retry: &RetryPolicy,
) -> Result<JsonResponse, TransportError> {
    let mut attempt: u32 = 0;
    loop {
        let res = client
            .get(url.clone())
            .header(AUTHORIZATION, auth_header(&cfg.token))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await;

        let res = match res {
            Ok(r) => r,
            Err(e) => {
                if attempt + 1 < retry.max_attempts {
                    warn!("GET {} error sending request: {}", url, e);
                    tokio::time::sleep(retry.backoff(attempt, None)).await;
                    attempt += 1;
                    continue;
                }
                return Err(TransportError::Request {
                    url: url.to_string(),
                    source: e,
                });
            }
        };

        let status = res.status();
        let headers = res.headers().clone();

        if status.is_success() {
            return match res.json::<serde_json::Value>().await {
                Ok(body) => Ok(JsonResponse { body, headers }),
                Err(e) => Err(TransportError::Decode {
                    url: url.to_string(),
                    source: e,
                    headers: Box::new(headers),
                }),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if attempt + 1 < retry.max_attempts {
                let backoff = retry.backoff(attempt, retry_after_duration(&headers));
                warn!(
                    "GET {} retrying (status {}), backoff {:?}",
                    url, status, backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }
        }

        let message = res.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            url: url.to_string(),
            status,
            message,
            headers: Box::new(headers),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_prefers_retry_after() {
        let retry = RetryPolicy::default();
        let d = retry.backoff(0, Some(Duration::from_secs(7)));
        assert_eq!(d, Duration::from_secs(7));
    }

    #[test]
    fn backoff_is_capped() {
        let retry = RetryPolicy {
            max_attempts: 8,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        };
        for attempt in 0..10 {
            assert!(retry.backoff(attempt, None) <= Duration::from_secs(5));
        }
    }

    #[test]
    fn build_url_encodes_cursor() {
        let url = build_url(
            "https://api.example.com/api/v2/users.json",
            &[
                ("page[size]", "100".to_string()),
                ("page[after]", "a+b/c==".to_string()),
            ],
        )
        .unwrap();
        let q = url.query().unwrap();
        assert!(q.contains("page%5Bsize%5D=100"));
        assert!(!q.contains("a+b/c=="), "cursor must be encoded: {}", q);
    }
}
