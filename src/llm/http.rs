//! HTTP client used by every model-provider adapter.
//!
//! One entry point, [`HttpClient::request_json`], wraps a request with:
//! per-attempt timeout merged with the caller's cancellation token, enforced
//! JSON content type, status-code → error mapping, and a retry budget with
//! exponential backoff and jitter. Sleeps between attempts honour
//! cancellation. URLs stored in error fields are scrubbed of credential
//! query parameters.

use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget outside of tests.
const DEFAULT_RETRIES: u32 = 2;

/// Base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Backoff ceiling before jitter.
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2000);

/// Upper bound (exclusive) of the per-sleep jitter in milliseconds.
const JITTER_MS: u64 = 50;

/// Maximum length of the body snippet preserved in errors.
const SNIPPET_LIMIT: usize = 2000;

/// Query parameter keys whose values never appear in error fields.
/// Matched case-sensitively.
const SENSITIVE_QUERY_KEYS: &[&str] = &[
    "key",
    "api_key",
    "apikey",
    "access_token",
    "token",
    "auth",
    "authorization",
];

// ─── HttpError ──────────────────────────────────────────────────────────────

/// Category of an HTTP failure. Each maps to one stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    ConnectionFailed,
    RateLimited,
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    ServerError,
    BadStatus,
    InvalidJson,
    /// The caller's cancellation token fired.
    Cancelled,
}

impl HttpErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            HttpErrorKind::Timeout => "http.timeout",
            HttpErrorKind::ConnectionFailed => "http.connection_failed",
            HttpErrorKind::RateLimited => "http.rate_limited",
            HttpErrorKind::Unauthorized => "http.unauthorized",
            HttpErrorKind::Forbidden => "http.forbidden",
            HttpErrorKind::NotFound => "http.not_found",
            HttpErrorKind::BadRequest => "http.bad_request",
            HttpErrorKind::ServerError => "http.server_error",
            HttpErrorKind::BadStatus => "http.bad_status",
            HttpErrorKind::InvalidJson => "http.invalid_json",
            HttpErrorKind::Cancelled => "llm.cancelled",
        }
    }
}

/// A normalised HTTP failure. `url` is already scrubbed.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retryable: bool,
    pub body_snippet: Option<String>,
    pub url: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.kind.code(), self.message, self.url)
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    fn new(kind: HttpErrorKind, message: impl Into<String>, retryable: bool, url: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retryable,
            body_snippet: None,
            url: url.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    fn cancelled(url: &str) -> Self {
        Self::new(HttpErrorKind::Cancelled, "request was cancelled", false, url)
    }

    fn timeout(timeout: Duration, url: &str) -> Self {
        Self::new(
            HttpErrorKind::Timeout,
            format!("request timed out after {} ms", timeout.as_millis()),
            true,
            url,
        )
    }

    /// Map a non-2xx status to an error per the fixed table.
    fn from_status(status: u16, body: String, url: &str) -> Self {
        let (kind, retryable) = match status {
            400 => (HttpErrorKind::BadRequest, false),
            401 => (HttpErrorKind::Unauthorized, false),
            403 => (HttpErrorKind::Forbidden, false),
            404 => (HttpErrorKind::NotFound, false),
            429 => (HttpErrorKind::RateLimited, true),
            500..=599 => (HttpErrorKind::ServerError, true),
            408..=499 => (HttpErrorKind::BadStatus, true),
            _ => (HttpErrorKind::BadStatus, false),
        };
        Self {
            kind,
            message: format!("unexpected status {status}"),
            status: Some(status),
            retryable,
            body_snippet: Some(snippet(&body)),
            url: url.to_string(),
        }
    }

    /// Classify a transport-level failure from reqwest.
    fn from_transport(error: &reqwest::Error, url: &str) -> Self {
        let message = error.to_string();
        let lower = message.to_lowercase();
        if error.is_timeout()
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("etimedout")
        {
            Self::new(HttpErrorKind::Timeout, message, true, url)
        } else {
            Self::new(HttpErrorKind::ConnectionFailed, message, true, url)
        }
    }
}

// ─── Request options ────────────────────────────────────────────────────────

/// Per-request options for [`HttpClient::request_json`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: reqwest::Method,
    /// Extra headers; `content-type: application/json` is enforced on top.
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
    /// Retry budget override. `None` uses [`default_retries`].
    pub retries: Option<u32>,
    /// Caller-side cancellation, merged with the per-attempt timeout.
    pub cancel: Option<CancellationToken>,
    /// Provider tag used in log lines.
    pub provider: Option<String>,
    /// Correlation id used in log lines.
    pub request_id: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: reqwest::Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            retries: None,
            cancel: None,
            provider: None,
            request_id: None,
        }
    }
}

impl RequestOptions {
    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: reqwest::Method::POST,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Retry budget used when the caller does not override it: 2 in production,
/// 0 under the test harness so failure-path tests stay fast.
pub fn default_retries() -> u32 {
    if cfg!(test) { 0 } else { DEFAULT_RETRIES }
}

// ─── HttpClient ─────────────────────────────────────────────────────────────

/// Shared HTTP client for provider adapters.
pub struct HttpClient {
    client: reqwest::Client,
    base_delay: Duration,
    max_delay: Duration,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Override the backoff window (used by tests to avoid real sleeps).
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Issue a request and decode the JSON response body.
    ///
    /// Retries only errors flagged retryable, up to the configured budget,
    /// sleeping `min(max_delay, base_delay · 2^attempt) + jitter` between
    /// attempts. Cancellation short-circuits both in-flight attempts and
    /// backoff sleeps with an `llm.cancelled` error.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        let scrubbed = scrub_url(url);
        let retries = options.retries.unwrap_or_else(default_retries);
        let cancel = options.cancel.clone().unwrap_or_default();

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(HttpError::cancelled(&scrubbed));
            }

            match self.attempt(url, &options, &cancel, &scrubbed).await {
                Ok(value) => return Ok(value),
                Err(error) if error.retryable && attempt < retries => {
                    let delay = backoff_delay(self.base_delay, self.max_delay, attempt);
                    tracing::debug!(
                        url = %scrubbed,
                        provider = options.provider.as_deref().unwrap_or("-"),
                        request_id = options.request_id.as_deref().unwrap_or("-"),
                        code = error.code(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying http request"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(HttpError::cancelled(&scrubbed)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        cancel: &CancellationToken,
        scrubbed: &str,
    ) -> Result<T, HttpError> {
        let mut request = self.client.request(options.method.clone(), url);
        for (key, value) in &options.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        // JSON in, JSON out; caller headers cannot override this.
        request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = &options.body {
            let bytes =
                serde_json::to_vec(body).map_err(|e| {
                    HttpError::new(HttpErrorKind::BadRequest, e.to_string(), false, scrubbed)
                })?;
            request = request.body(bytes);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(HttpError::cancelled(scrubbed)),
            sent = tokio::time::timeout(options.timeout, request.send()) => match sent {
                Err(_) => return Err(HttpError::timeout(options.timeout, scrubbed)),
                Ok(Err(e)) => return Err(HttpError::from_transport(&e, scrubbed)),
                Ok(Ok(response)) => response,
            }
        };

        let status = response.status().as_u16();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(HttpError::cancelled(scrubbed)),
            body = tokio::time::timeout(options.timeout, response.text()) => match body {
                Err(_) => return Err(HttpError::timeout(options.timeout, scrubbed)),
                Ok(Err(e)) => return Err(HttpError::from_transport(&e, scrubbed)),
                Ok(Ok(text)) => text,
            }
        };

        if !(200..300).contains(&status) {
            return Err(HttpError::from_status(status, text, scrubbed));
        }

        serde_json::from_str::<T>(&text).map_err(|e| HttpError {
            kind: HttpErrorKind::InvalidJson,
            message: format!("response body is not valid JSON: {e}"),
            status: Some(status),
            retryable: false,
            body_snippet: Some(snippet(&text)),
            url: scrubbed.to_string(),
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LIMIT).collect()
}

fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt)).min(max);
    let jitter = Duration::from_millis(rand::rng().random_range(0..JITTER_MS));
    exponential + jitter
}

/// Replace the values of credential-carrying query parameters with
/// `REDACTED`. Unparseable URLs pass through unchanged.
pub fn scrub_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if SENSITIVE_QUERY_KEYS.contains(&k.as_ref()) {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_table() {
        let e = HttpError::from_status(400, String::new(), "u");
        assert_eq!(e.kind, HttpErrorKind::BadRequest);
        assert!(!e.retryable);

        let e = HttpError::from_status(401, String::new(), "u");
        assert_eq!(e.code(), "http.unauthorized");

        let e = HttpError::from_status(403, String::new(), "u");
        assert_eq!(e.code(), "http.forbidden");

        let e = HttpError::from_status(404, String::new(), "u");
        assert_eq!(e.code(), "http.not_found");

        let e = HttpError::from_status(429, String::new(), "u");
        assert_eq!(e.kind, HttpErrorKind::RateLimited);
        assert!(e.retryable);

        let e = HttpError::from_status(503, String::new(), "u");
        assert_eq!(e.kind, HttpErrorKind::ServerError);
        assert!(e.retryable);

        // Other 4xx in 408..=499 are retryable bad statuses.
        let e = HttpError::from_status(409, String::new(), "u");
        assert_eq!(e.kind, HttpErrorKind::BadStatus);
        assert!(e.retryable);

        // Below 408 (and outside the table) is terminal.
        let e = HttpError::from_status(405, String::new(), "u");
        assert_eq!(e.kind, HttpErrorKind::BadStatus);
        assert!(!e.retryable);

        let e = HttpError::from_status(301, String::new(), "u");
        assert!(!e.retryable);
    }

    #[test]
    fn body_snippet_is_capped() {
        let long = "x".repeat(5000);
        let e = HttpError::from_status(500, long, "u");
        assert_eq!(e.body_snippet.unwrap().len(), SNIPPET_LIMIT);
    }

    #[test]
    fn scrub_url_redacts_sensitive_keys() {
        let scrubbed = scrub_url("https://api.example.com/v1?api_key=secret123&model=llama3");
        assert!(scrubbed.contains("api_key=REDACTED"));
        assert!(scrubbed.contains("model=llama3"));
        assert!(!scrubbed.contains("secret123"));
    }

    #[test]
    fn scrub_url_is_case_sensitive() {
        let scrubbed = scrub_url("https://api.example.com/v1?API_KEY=secret123");
        assert!(scrubbed.contains("secret123"));
    }

    #[test]
    fn scrub_url_passes_through_unparseable() {
        assert_eq!(scrub_url("not a url"), "not a url");
    }

    #[test]
    fn scrub_url_without_query_is_unchanged() {
        assert_eq!(
            scrub_url("http://localhost:11434/api/tags"),
            "http://localhost:11434/api/tags"
        );
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(250);
        let max = Duration::from_millis(2000);
        let jitter_bound = Duration::from_millis(JITTER_MS);

        let d0 = backoff_delay(base, max, 0);
        assert!(d0 >= base && d0 < base + jitter_bound);

        let d2 = backoff_delay(base, max, 2);
        assert!(d2 >= Duration::from_millis(1000));

        let d8 = backoff_delay(base, max, 8);
        assert!(d8 < max + jitter_bound);
    }

    #[test]
    fn default_retries_is_zero_under_test() {
        assert_eq!(default_retries(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_makes_no_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = HttpClient::new();
        let result: Result<serde_json::Value, _> = client
            .request_json(
                "http://127.0.0.1:1/never",
                RequestOptions::default().with_cancel(cancel),
            )
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Cancelled);
        assert_eq!(err.code(), "llm.cancelled");
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn connection_refused_maps_to_connection_failed() {
        let client = HttpClient::new().with_backoff(
            Duration::from_millis(1),
            Duration::from_millis(2),
        );
        // Port 1 refuses connections immediately on loopback.
        let result: Result<serde_json::Value, _> = client
            .request_json(
                "http://127.0.0.1:1/models",
                RequestOptions::default().with_retries(0),
            )
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::ConnectionFailed);
        assert!(err.retryable);
    }

    #[test]
    fn error_display_includes_code_and_scrubbed_url() {
        let e = HttpError::from_status(429, String::new(), "https://x/?x=1");
        let text = e.to_string();
        assert!(text.contains("http.rate_limited"));
        assert!(text.contains("https://x/?x=1"));
    }

    // ── Loopback-server tests ────────────────────────────────────────────

    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve the same raw HTTP response to every connection, counting hits.
    async fn spawn_server(response: &'static str) -> (std::net::SocketAddr, std::sync::Arc<AtomicUsize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = std::sync::Arc::new(AtomicUsize::new(0));
        let hits_server = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                hits_server.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    fn fast_client() -> HttpClient {
        HttpClient::new().with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn ok_json_body_is_decoded() {
        let (addr, _hits) = spawn_server(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}",
        )
        .await;
        let value: serde_json::Value = fast_client()
            .request_json(&format!("http://{addr}/v1/models"), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn non_json_success_body_is_invalid_json_with_snippet() {
        let (addr, _hits) = spawn_server(
            "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 14\r\nconnection: close\r\n\r\n<html>oops</h>",
        )
        .await;
        let result: Result<serde_json::Value, _> = fast_client()
            .request_json(&format!("http://{addr}/v1/models"), RequestOptions::default())
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::InvalidJson);
        assert!(!err.retryable);
        assert!(err.body_snippet.unwrap().contains("<html>"));
    }

    #[tokio::test]
    async fn rate_limited_retries_then_surfaces() {
        let (addr, hits) = spawn_server(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let result: Result<serde_json::Value, _> = fast_client()
            .request_json(
                &format!("http://{addr}/v1/models"),
                RequestOptions::default().with_retries(2),
            )
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::RateLimited);
        // One initial attempt plus two retries.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_status_is_not_retried() {
        let (addr, hits) = spawn_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let result: Result<serde_json::Value, _> = fast_client()
            .request_json(
                &format!("http://{addr}/v1/models"),
                RequestOptions::default().with_retries(2),
            )
            .await;
        assert_eq!(result.unwrap_err().kind, HttpErrorKind::Unauthorized);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
