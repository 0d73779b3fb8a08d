//! Retry transport for outbound model calls
//!
//! Every attempt runs under its own deadline, which covers reading the whole
//! body. Responses with status 429 or 5xx and network failures are retried
//! with exponential backoff; any other response is handed back untouched so
//! the caller can classify it.

use std::time::Duration;

use rand::Rng;
use reqwest::{RequestBuilder, StatusCode, header::HeaderMap, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Upper bound applied to server-supplied `Retry-After` hints
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Random jitter added to every retry delay, in milliseconds
const MAX_JITTER_MS: u64 = 200;

/// Retry configuration for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the attempt following `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }
}

/// Whether a response status is worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Parse a `Retry-After` header value, either delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str, now: chrono::DateTime<chrono::Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            let millis = (seconds * 1000.0).round() as u64;
            return Some(Duration::from_millis(millis).min(MAX_RETRY_AFTER));
        }
        return None;
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&chrono::Utc) - now;
    let wait = wait.to_std().unwrap_or(Duration::ZERO);
    Some(wait.min(MAX_RETRY_AFTER))
}

/// A fully read provider response
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, chrono::Utc::now()))
    }
}

/// One attempt: send the request and read the body to the end
async fn fetch_reply(request: RequestBuilder) -> reqwest::Result<Reply> {
    let response = request.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(Reply {
        status,
        headers,
        body,
    })
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..MAX_JITTER_MS))
}

/// Send a request built by `build`, retrying according to `policy`
///
/// `build` is invoked once per attempt. Returns the first successful
/// response, the first non-retryable response, or the last response once
/// attempts are exhausted. Network failures on the final attempt, including
/// a connection lost while reading the body, become [`ClientError::Timeout`]
/// or [`ClientError::Unavailable`].
pub async fn send_with_retry<F>(build: F, policy: &RetryPolicy) -> Result<Reply>
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        let outcome = tokio::time::timeout(policy.timeout, fetch_reply(build())).await;

        let delay = match outcome {
            Ok(Ok(reply)) => {
                let status = reply.status;
                if status.is_success() || !is_retryable_status(status) || attempt >= max_attempts {
                    debug!(attempt, status = status.as_u16(), "Model request finished");
                    return Ok(reply);
                }

                let delay = policy.backoff(attempt, reply.retry_after()) + jitter();
                warn!(
                    attempt,
                    status = status.as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "Retryable model response, backing off"
                );
                delay
            }
            Ok(Err(e)) => {
                if attempt >= max_attempts {
                    return Err(if e.is_timeout() {
                        ClientError::Timeout { attempts: attempt }
                    } else {
                        ClientError::Unavailable {
                            attempts: attempt,
                            source: e,
                        }
                    });
                }
                let delay = policy.backoff(attempt, None) + jitter();
                warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Model request failed, retrying");
                delay
            }
            Err(_) => {
                if attempt >= max_attempts {
                    return Err(ClientError::Timeout { attempts: attempt });
                }
                let delay = policy.backoff(attempt, None) + jitter();
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Model request timed out, retrying");
                delay
            }
        };

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_server;
    use axum::{
        Router,
        extract::State,
        http::HeaderValue,
        response::{IntoResponse, Response as AxumResponse},
        routing::post,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Script {
        responses: Mutex<VecDeque<(u16, Option<&'static str>)>>,
        hits: AtomicU32,
        delay: Duration,
    }

    impl Script {
        fn new(responses: &[(u16, Option<&'static str>)]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().copied().collect()),
                hits: AtomicU32::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                hits: AtomicU32::new(0),
                delay,
            })
        }
    }

    async fn scripted(State(script): State<Arc<Script>>) -> AxumResponse {
        script.hits.fetch_add(1, Ordering::SeqCst);
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        let (status, retry_after) = script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((200, None));
        let status = axum::http::StatusCode::from_u16(status).unwrap();
        let mut response = (status, "scripted").into_response();
        if let Some(value) = retry_after {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static(value));
        }
        response
    }

    async fn serve(script: Arc<Script>) -> String {
        let app = Router::new()
            .route("/call", post(scripted))
            .with_state(script);
        format!("{}/call", spawn_server(app).await)
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let script = Script::new(&[(503, None), (503, None), (200, None)]);
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();

        let response = send_with_retry(|| client.post(&url), &fast_policy(2))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_honors_retry_after_seconds() {
        let script = Script::new(&[(429, Some("1")), (200, None)]);
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..fast_policy(2)
        };

        let started = Instant::now();
        let response = send_with_retry(|| client.post(&url), &policy).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(script.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retries_returns_first_failure() {
        let script = Script::new(&[(500, None), (200, None)]);
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();

        let response = send_with_retry(|| client.post(&url), &fast_policy(0))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let script = Script::new(&[(400, None), (200, None)]);
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();

        let response = send_with_retry(|| client.post(&url), &fast_policy(2))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(script.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_response() {
        let script = Script::new(&[(503, None), (503, None), (503, None)]);
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();

        let response = send_with_retry(|| client.post(&url), &fast_policy(2))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(script.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_per_attempt_deadline() {
        let script = Script::slow(Duration::from_millis(500));
        let url = serve(script.clone()).await;
        let client = reqwest::Client::new();
        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            ..fast_policy(1)
        };

        let err = send_with_retry(|| client.post(&url), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { attempts: 2 }));
        assert_eq!(err.error_type(), "upstream_timeout");
        assert_eq!(script.hits.load(Ordering::SeqCst), 2);
    }

    /// Read one request, headers and body, off the socket
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let line = line.to_ascii_lowercase();
                        line.strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Plain TCP server writing hand-made HTTP replies
    ///
    /// Connection `n` gets `replies[n]` (the last one repeats): the first part
    /// is written, then after the pause the rest, then the socket is closed.
    async fn serve_raw(
        replies: Vec<(&'static str, Duration, &'static str)>,
    ) -> (String, Arc<AtomicU32>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
                let (head, pause, rest) = replies[n.min(replies.len() - 1)];
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(pause).await;
                    let _ = socket.write_all(rest.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{}/call", addr), hits)
    }

    const PARTIAL_HEAD: &str =
        "HTTP/1.1 200 OK\r\ncontent-length: 20\r\nconnection: close\r\n\r\npartial";

    #[tokio::test]
    async fn test_deadline_covers_slow_body() {
        let (url, hits) = serve_raw(vec![(
            PARTIAL_HEAD,
            Duration::from_secs(3),
            "0123456789abc",
        )])
        .await;
        let client = reqwest::Client::new();
        let policy = RetryPolicy {
            timeout: Duration::from_millis(200),
            ..fast_policy(0)
        };

        let started = Instant::now();
        let err = send_with_retry(|| client.post(&url), &policy)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, ClientError::Timeout { attempts: 1 }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_lost_mid_body_is_retried() {
        let (url, hits) = serve_raw(vec![
            (PARTIAL_HEAD, Duration::ZERO, ""),
            (
                "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                Duration::ZERO,
                "",
            ),
        ])
        .await;
        let client = reqwest::Client::new();

        let reply = send_with_retry(|| client.post(&url), &fast_policy(1))
            .await
            .unwrap();

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, b"ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_lost_mid_body_on_last_attempt_is_unavailable() {
        let (url, _hits) = serve_raw(vec![(PARTIAL_HEAD, Duration::ZERO, "")]).await;
        let client = reqwest::Client::new();

        let err = send_with_retry(|| client.post(&url), &fast_policy(0))
            .await
            .unwrap_err();

        assert_eq!(err.error_type(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{}/call", addr);
        let client = reqwest::Client::new();

        let err = send_with_retry(|| client.post(&url), &fast_policy(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Unavailable { attempts: 2, .. }));
        assert_eq!(err.error_type(), "upstream_unavailable");
    }

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, None), Duration::from_millis(500));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3, None), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10, None), Duration::from_millis(5000));
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(8))),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let now = chrono::Utc::now();
        assert_eq!(parse_retry_after("2", now), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("0.5", now), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("3600", now), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("-1", now), None);
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("", now), None);

        let later = (now + chrono::Duration::seconds(4)).to_rfc2822();
        let parsed = parse_retry_after(&later, now).unwrap();
        assert!(parsed <= Duration::from_secs(4) && parsed >= Duration::from_secs(3));

        let past = (now - chrono::Duration::seconds(30)).to_rfc2822();
        assert_eq!(parse_retry_after(&past, now), Some(Duration::ZERO));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
