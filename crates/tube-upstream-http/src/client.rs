use crate::error::UpstreamError;
use crate::parse::parse_lines;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;
use tube_core::LineRecord;

/// A request C4 sends to the upstream HTTP transport (§6.2).
#[derive(Debug, Clone)]
pub enum UpstreamRequest {
    /// `GET {base}/Line/Mode/tube/Status`
    AllLines,
    /// `GET {base}/Line/{line}/Status/{from}/to/{to}`
    LineDateRange {
        line_id: String,
        from: NaiveDate,
        to: NaiveDate,
    },
}

/// The successful result of an upstream call: the parsed line records.
/// C4 is responsible for stamping these into a [`tube_core::Snapshot`].
pub type UpstreamResponse = Vec<LineRecord>;

/// A `tower::Service` wrapping a [`reqwest::Client`] against the tube-status
/// upstream (§6.2). Stateless: `poll_ready` is always immediately ready, all
/// backpressure is handled by C2/C3 above this layer.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    /// Creates a client against `base_url` using a default `reqwest::Client`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client reusing a caller-supplied `reqwest::Client` (for
    /// shared connection pooling or custom TLS/proxy configuration).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl Service<UpstreamRequest> for UpstreamClient {
    type Response = UpstreamResponse;
    type Error = UpstreamError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UpstreamRequest) -> Self::Future {
        let http = self.http.clone();
        let url = match &req {
            UpstreamRequest::AllLines => format!("{}/Line/Mode/tube/Status", self.base_url),
            UpstreamRequest::LineDateRange { line_id, from, to } => format!(
                "{}/Line/{}/Status/{}/to/{}",
                self.base_url,
                line_id,
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            ),
        };

        Box::pin(async move {
            let response = http
                .get(&url)
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(UpstreamError::from_status(status.as_u16(), retry_after));
            }

            let body = response
                .text()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            parse_lines(&body).map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
        })
    }
}
