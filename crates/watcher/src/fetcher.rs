//! Status fetcher: one logical "get current attempt" call against the Academy.
//!
//! Transport failures are retried here with a fixed delay and a fixed number
//! of tries. HTTP errors are not retried; they are surfaced to the poll loop,
//! after one optional switch from bearer to cookie auth.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, REFERER};
use serde::Deserialize;

use htb_common::config::{HtbConfig, PollSettings};
use htb_common::error::{WatchError, truncate_body};
use htb_common::types::{AttemptRecord, ExamCode, FetchOutcome};

/// Anything the poll loop can ask for the current attempt.
#[async_trait]
pub trait AttemptSource: Send {
    async fn fetch_attempt(&mut self) -> FetchOutcome;
}

/// How requests to the attempts endpoint authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    Cookie(String),
    Anonymous,
}

impl Auth {
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Cookie(_) => "cookie",
            Auth::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Response envelope of the attempts endpoint.
#[derive(Debug, Deserialize)]
struct AttemptsEnvelope {
    #[serde(default)]
    data: Option<Vec<AttemptRecord>>,
}

/// HTTP client for `GET /api/v2/exams/{exam_id}/attempts`.
pub struct StatusClient {
    client: reqwest::Client,
    url: String,
    referer: String,
    auth: Auth,
    /// Cookie to switch to, once, if bearer auth is rejected.
    fallback_cookie: Option<String>,
    max_tries: u32,
    retry_delay: Duration,
}

impl StatusClient {
    pub fn new(
        client: reqwest::Client,
        htb: &HtbConfig,
        polling: &PollSettings,
        auth: Auth,
    ) -> Self {
        Self {
            client,
            url: attempts_url(&htb.academy_url, htb.exam),
            referer: format!("{}/exams/{}/", htb.academy_url, htb.exam.exam_id()),
            auth,
            fallback_cookie: None,
            max_tries: polling.fetch_max_tries.max(1),
            retry_delay: polling.fetch_retry_delay,
        }
    }

    /// Allow a single switch to cookie auth when the bearer token is rejected.
    pub fn with_cookie_fallback(mut self, cookie: Option<String>) -> Self {
        if matches!(self.auth, Auth::Bearer(_)) {
            self.fallback_cookie = cookie;
        }
        self
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// One fetch including network retries.
    async fn fetch_with_retries(&self) -> FetchOutcome {
        retry_network(self.max_tries, self.retry_delay, || self.fetch_once())
            .await
            .unwrap_or(FetchOutcome::NetworkExhausted)
    }

    /// A single request. `Err` is reserved for network-class failures.
    async fn fetch_once(&self) -> Result<FetchOutcome, WatchError> {
        let request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .header(REFERER, &self.referer);

        let request = match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Cookie(cookie) => request.header(COOKIE, cookie),
            Auth::Anonymous => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(FetchOutcome::HttpError {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response.text().await?;
        let envelope: AttemptsEnvelope = serde_json::from_str(&body)
            .map_err(|e| WatchError::Decode(format!("attempts response: {}", e)))?;
        Ok(match envelope.data.unwrap_or_default().into_iter().next() {
            Some(record) => FetchOutcome::Attempt(record),
            None => FetchOutcome::Empty,
        })
    }
}

#[async_trait]
impl AttemptSource for StatusClient {
    async fn fetch_attempt(&mut self) -> FetchOutcome {
        let outcome = self.fetch_with_retries().await;

        if let FetchOutcome::HttpError { status, .. } = &outcome
            && let Some(cookie) = self.fallback_cookie.take()
        {
            tracing::warn!(
                status,
                "Bearer token rejected, retrying once with HTB_COOKIE"
            );
            self.auth = Auth::Cookie(cookie);
            return self.fetch_with_retries().await;
        }

        outcome
    }
}

/// Attempts endpoint for an exam under the given Academy base URL.
pub fn attempts_url(academy_url: &str, exam: ExamCode) -> String {
    format!("{}/api/v2/exams/{}/attempts", academy_url, exam.exam_id())
}

/// Run `op` up to `max_tries` times, sleeping `delay` between failures.
///
/// Returns `None` once every try has failed.
pub async fn retry_network<T, F, Fut>(max_tries: u32, delay: Duration, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WatchError>>,
{
    for attempt in 1..=max_tries {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_tries,
                    error = %e,
                    "Network error while fetching attempt status"
                );
                if attempt < max_tries {
                    tracing::info!(delay_secs = delay.as_secs(), "Retrying after fixed delay");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    tracing::error!(max_tries, "Network retries exhausted, no data this round");
    None
}
