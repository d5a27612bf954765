//! Async runner for [`RetryPolicy`], and the transient/permanent split for
//! HTTP failures.
//!
//! Rate limiting (429), request timeouts (408), server errors (5xx) and
//! network errors are transient. Any other non-success status is permanent
//! and is not retried.

use std::future::Future;

use rag_core::retry::RetryPolicy;
use thiserror::Error;
use tracing::warn;

/// A non-success HTTP status from a remote model service.
#[derive(Debug, Error)]
#[error("{service} API error {status}: {body}")]
pub struct HttpStatusError {
    pub service: &'static str,
    pub status: reqwest::StatusCode,
    pub body: String,
}

impl HttpStatusError {
    pub fn is_transient(&self) -> bool {
        self.status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || self.status == reqwest::StatusCode::REQUEST_TIMEOUT
            || self.status.is_server_error()
    }
}

/// Pass a successful response through, or turn its status and body into an
/// [`HttpStatusError`].
pub async fn error_for_status(
    response: reqwest::Response,
    service: &'static str,
) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpStatusError { service, status, body }.into())
}

/// Whether retrying `err` can help. Only a permanent HTTP status says no.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<HttpStatusError>()
        .map_or(true, HttpStatusError::is_transient)
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// On exhaustion returns the last error together with the number of
/// attempts made. `label` only appears in log events.
pub async fn retry_async<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    op: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_when(policy, label, |_| true, op).await
}

/// Like [`retry_async`], but stops at the first error `retryable` rejects.
pub async fn retry_async_when<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    retryable: P,
    mut op: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts() => {
                warn!(op = label, attempt, error = %e, "giving up");
                return Err((e, attempt));
            }
            Err(e) if !retryable(&e) => {
                warn!(op = label, attempt, error = %e, "permanent failure, not retrying");
                return Err((e, attempt));
            }
            Err(e) => {
                warn!(op = label, attempt, max = policy.max_attempts(), error = %e, "attempt failed, retrying");
                attempt += 1;
            }
        }
    }
}
