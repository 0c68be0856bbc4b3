use tube_circuitbreaker::CircuitBreakerError;
use tube_core::CoreError;
use tube_retry::RetryError;
use tube_upstream_http::UpstreamError;

/// Maps the nested `CircuitBreaker<Retry<Upstream>>` error stack into the
/// flat [`CoreError`] taxonomy C4 hands to C6 (§7). This is the one place in
/// the workspace where the three layers' error types meet.
pub(crate) fn to_core_error(
    err: CircuitBreakerError<RetryError<UpstreamError>>,
) -> CoreError {
    match err {
        CircuitBreakerError::Refused { retry_after } => CoreError::CircuitRefused { retry_after },
        CircuitBreakerError::Failed(retry_err) => match retry_err {
            RetryError::NonRetryable(upstream_err) => upstream_to_core(upstream_err),
            RetryError::Exhausted {
                last_cause,
                attempts,
            } => CoreError::RetriesExhausted {
                attempts,
                last_cause: last_cause.to_string(),
            },
        },
    }
}

fn upstream_to_core(err: UpstreamError) -> CoreError {
    match err {
        UpstreamError::Transport(msg) => CoreError::TransportError(msg),
        UpstreamError::Retryable {
            status,
            retry_after,
        } => CoreError::UpstreamRetryableStatus {
            status,
            retry_after,
        },
        UpstreamError::Fatal { status } => CoreError::UpstreamFatalStatus { status },
        UpstreamError::MalformedResponse(msg) => CoreError::BadRequest(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn refused_maps_to_circuit_refused() {
        let err: CircuitBreakerError<RetryError<UpstreamError>> = CircuitBreakerError::Refused {
            retry_after: Duration::from_secs(5),
        };
        assert!(matches!(
            to_core_error(err),
            CoreError::CircuitRefused { retry_after } if retry_after == Duration::from_secs(5)
        ));
    }

    #[test]
    fn fatal_status_maps_to_upstream_fatal_status() {
        let err = CircuitBreakerError::Failed(RetryError::NonRetryable(UpstreamError::Fatal {
            status: 404,
        }));
        assert!(matches!(
            to_core_error(err),
            CoreError::UpstreamFatalStatus { status: 404 }
        ));
    }

    #[test]
    fn exhausted_maps_to_retries_exhausted() {
        let err: CircuitBreakerError<RetryError<UpstreamError>> =
            CircuitBreakerError::Failed(RetryError::Exhausted {
                last_cause: UpstreamError::Retryable {
                    status: 503,
                    retry_after: None,
                },
                attempts: 4,
            });
        assert!(matches!(
            to_core_error(err),
            CoreError::RetriesExhausted { attempts: 4, .. }
        ));
    }
}
