use std::time::Duration;

pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub(crate) fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after;
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    let scale = 2_u64.pow(exponent);
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(scale))
}

pub(crate) fn is_retryable_matrix_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub(crate) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which failures a request may be re-sent after.
pub(crate) enum RetryScope {
    /// 429, 5xx and transient transport failures.
    Transient,
    /// Only failures the homeserver cannot have acted on: 429 and connect errors.
    RateLimited,
}

impl RetryScope {
    pub(crate) fn retries_status(self, status: u16) -> bool {
        match self {
            Self::Transient => is_retryable_matrix_status(status),
            Self::RateLimited => status == 429,
        }
    }

    pub(crate) fn retries_transport_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Transient => is_retryable_transport_error(error),
            Self::RateLimited => error.is_connect(),
        }
    }
}

pub(crate) fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Returns the current Unix timestamp in milliseconds.
pub(crate) fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
