use std::time::Duration;
use thiserror::Error;

/// Errors from a call to the upstream line-status API (§6.2).
///
/// This is the error type C4's retry/circuit-breaker stack classifies
/// against; it is never seen outside the gateway.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Connect/read/DNS failure — never got an HTTP response at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// 408, 429, or 5xx: worth retrying. `retry_after` comes from the
    /// response's `Retry-After` header when present (mainly 429).
    #[error("retryable upstream status {status}")]
    Retryable {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Any other 4xx: the request itself is wrong, retrying won't help.
    #[error("fatal upstream status {status}")]
    Fatal { status: u16 },

    /// A 2xx response whose body didn't parse as the expected shape.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    /// Classifies a status code per §6.2: 408/429/5xx retryable, other 4xx
    /// fatal. Callers only see this for 4xx/5xx; 2xx is handled by the caller
    /// before this is ever constructed.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        if status == 408 || status == 429 || (500..600).contains(&status) {
            UpstreamError::Retryable {
                status,
                retry_after,
            }
        } else {
            UpstreamError::Fatal { status }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Transport(_) | UpstreamError::Retryable { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            UpstreamError::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The raw status code, if this error originated from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Retryable { status, .. } | UpstreamError::Fatal { status } => {
                Some(*status)
            }
            UpstreamError::Transport(_) | UpstreamError::MalformedResponse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_408_429_5xx_as_retryable() {
        for status in [408, 429, 500, 503] {
            assert!(UpstreamError::from_status(status, None).is_retryable());
        }
    }

    #[test]
    fn classifies_other_4xx_as_fatal() {
        for status in [400, 401, 403, 404, 422] {
            assert!(!UpstreamError::from_status(status, None).is_retryable());
        }
    }
}
