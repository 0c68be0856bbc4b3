//! Fakes shared across the workspace-root scenario tests (§10.4): an
//! in-memory upstream service standing in for `UpstreamClient`, so these
//! tests exercise C4 through C7 without touching the network.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::util::service_fn;
use tube_core::{Disruption, LineRecord};
use tube_gateway::{UpstreamError, UpstreamRequest};

/// Two known lines, both `Good Service`, as used by S1/S2's fixture payload.
pub fn good_service_lines() -> Vec<LineRecord> {
    vec![
        LineRecord {
            id: "central".into(),
            name: "Central".into(),
            status: "Good Service".into(),
            status_description: "Good Service".into(),
            disruptions: vec![],
        },
        LineRecord {
            id: "victoria".into(),
            name: "Victoria".into(),
            status: "Good Service".into(),
            status_description: "Good Service".into(),
            disruptions: vec![],
        },
    ]
}

pub fn disrupted_line(id: &str) -> LineRecord {
    LineRecord {
        id: id.to_string(),
        name: id.to_string(),
        status: "Severe Delays".into(),
        status_description: "Severe Delays".into(),
        disruptions: vec![Disruption {
            category: "signalFailure".into(),
            description: "Signal failure".into(),
            planned: false,
        }],
    }
}

/// An upstream fake that always succeeds with `lines`, after `delay`,
/// counting how many times it was called.
pub fn counting_upstream(
    lines: Vec<LineRecord>,
    delay: Duration,
) -> (
    impl tower::Service<UpstreamRequest, Response = Vec<LineRecord>, Error = UpstreamError> + Clone,
    Arc<AtomicUsize>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let svc = service_fn(move |_req: UpstreamRequest| {
        let counter = Arc::clone(&counter);
        let lines = lines.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, UpstreamError>(lines)
        }
    });
    (svc, calls)
}

/// An upstream fake that always fails with `err`, counting calls.
pub fn failing_upstream(
    err: UpstreamError,
) -> (
    impl tower::Service<UpstreamRequest, Response = Vec<LineRecord>, Error = UpstreamError> + Clone,
    Arc<AtomicUsize>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let svc = service_fn(move |_req: UpstreamRequest| {
        let counter = Arc::clone(&counter);
        let err = err.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Vec<LineRecord>, _>(err)
        }
    });
    (svc, calls)
}
