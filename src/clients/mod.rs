//! HTTP clients for the engine's collaborator services.
//!
//! Three outbound dependencies sit behind traits so the batch logic can be
//! tested without a network: the transactional mail service, the drafting
//! model, and the document classifier. The live implementations share the
//! retry plumbing below.
//!
//! Modules:
//! - mail: transactional email delivery
//! - drafter: AI text generation for message bodies
//! - classifier: document classification

pub mod classifier;
pub mod drafter;
pub mod mail;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Unusable response: {0}")]
    InvalidResponse(String),
    #[error("Client misconfigured: {0}")]
    Misconfigured(String),
}

impl CollabError {
    /// Whether a later tick could plausibly succeed. Misconfiguration and
    /// 4xx rejections are permanent until a human intervenes.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollabError::Http(e) => e.is_timeout() || e.is_connect(),
            CollabError::ApiError { status, .. } => {
                *status == 429 || *status == 408 || *status >= 500
            }
            CollabError::InvalidResponse(_) | CollabError::Misconfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying transient failures with capped exponential
/// backoff. Honors `Retry-After` on 429 responses. Engine ticks run on
/// blocking worker threads, so the sleeps here are plain thread sleeps.
pub fn send_with_retry(
    request: reqwest::blocking::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::blocking::Response, CollabError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().map_err(CollabError::Http);
        };

        match cloned.send() {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "outbound retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    std::thread::sleep(delay);
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "outbound retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    continue;
                }
                return Err(CollabError::Http(err));
            }
        }
    }

    Err(CollabError::InvalidResponse(
        "request exhausted retries".to_string(),
    ))
}

/// Resolve a non-success response into an API error carrying the body text.
pub(crate) fn ensure_success(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, CollabError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(CollabError::ApiError {
        status: status.as_u16(),
        message,
    })
}

/// Build the blocking client the collaborator implementations share.
/// Every request carries a hard timeout so a hung service cannot pin a
/// tick's worker thread.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, CollabError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(CollabError::Http)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decision_table() {
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::BAD_GATEWAY),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::REQUEST_TIMEOUT),
            RetryDecision::Retryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::NOT_FOUND),
            RetryDecision::NonRetryable
        );
        assert_eq!(
            retry_decision_for_status(reqwest::StatusCode::UNAUTHORIZED),
            RetryDecision::NonRetryable
        );
    }

    #[test]
    fn test_retry_delay_backoff_and_cap() {
        let policy = RetryPolicy::default();
        let first = retry_delay(1, &policy, None).as_millis() as u64;
        let second = retry_delay(2, &policy, None).as_millis() as u64;
        let fifth = retry_delay(5, &policy, None).as_millis() as u64;

        // Jitter adds at most 150ms on top of the base
        assert!((250..250 + 150).contains(&first));
        assert!((500..500 + 150).contains(&second));
        assert!((2_000..2_000 + 150).contains(&fifth), "capped at max backoff");
    }

    #[test]
    fn test_retry_delay_honors_retry_after() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("2");
        assert_eq!(retry_delay(1, &policy, Some(&header)), Duration::from_secs(2));

        // Absurd server values are clamped
        let header = reqwest::header::HeaderValue::from_static("86400");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(CollabError::ApiError {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(CollabError::ApiError {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!CollabError::ApiError {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!CollabError::Misconfigured("no api key".into()).is_retryable());
    }
}
