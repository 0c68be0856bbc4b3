use crate::config::ReadApiConfig;
use crate::meta::{Meta, ReadReply};
use chrono::NaiveDate;
use std::sync::Arc;
use tube_core::{Clock, CoreError, Snapshot};
use tube_coordinator::CoordinatorHandle;
use tube_gateway::GatewayHandle;

/// Shapes external read requests into coordinator/gateway calls (C7, §4.7).
/// Holds no state of its own beyond configuration: every call either asks
/// the coordinator for the cached value or, for historical ranges, goes
/// straight to the gateway.
pub struct ReadApi {
    coordinator: CoordinatorHandle,
    gateway: GatewayHandle,
    config: ReadApiConfig,
    clock: Arc<dyn Clock>,
}

impl ReadApi {
    pub fn new(
        coordinator: CoordinatorHandle,
        gateway: GatewayHandle,
        config: ReadApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            gateway,
            config,
            clock,
        }
    }

    /// `getAllStatus(maxAgeMs) → {snapshot, meta}` (§6.1).
    pub async fn get_all_status(&self, max_age_ms: Option<u64>) -> Result<ReadReply, CoreError> {
        let (snapshot, stale, floor_applied) = self.fetch(max_age_ms).await?;
        Ok(self.wrap(snapshot, stale, floor_applied))
    }

    /// `getLineStatus(lineId) → {snapshot filtered to one line, meta}`
    /// (§6.1). `lineId` is matched case-insensitively; no match is
    /// `NotFound`.
    pub async fn get_line_status(
        &self,
        line_id: &str,
        max_age_ms: Option<u64>,
    ) -> Result<ReadReply, CoreError> {
        let (snapshot, stale, floor_applied) = self.fetch(max_age_ms).await?;
        let filtered = snapshot
            .filtered_to_line(line_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown line id: {line_id}")))?;
        Ok(self.wrap(filtered, stale, floor_applied))
    }

    /// `getLineStatusDateRange(lineId, from, to) → {snapshot, meta}` (§6.1).
    /// Bypasses the coordinator entirely; goes straight to C4's
    /// `FetchLineWithDateRange`. Per-request `(lineId, from, to)`
    /// uniqueness would blow up cache cardinality without benefit (§4.7).
    pub async fn get_line_status_date_range(
        &self,
        line_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReadReply, CoreError> {
        if from > to {
            return Err(CoreError::BadRequest(format!(
                "from ({from}) must be <= to ({to})"
            )));
        }
        let snapshot = self
            .gateway
            .fetch_line_date_range(line_id, from, to)
            .await?;
        Ok(self.wrap(snapshot, false, false))
    }

    /// `getDisruptions() → {snapshot filtered to lines with at least one
    /// unplanned disruption, meta}` (§6.1).
    pub async fn get_disruptions(&self, max_age_ms: Option<u64>) -> Result<ReadReply, CoreError> {
        let (snapshot, stale, floor_applied) = self.fetch(max_age_ms).await?;
        Ok(self.wrap(snapshot.filtered_to_disruptions(), stale, floor_applied))
    }

    /// Clamps `max_age_ms` to the floor, then asks the coordinator. `None`
    /// means "no freshness requirement" — an immediate, possibly-stale read
    /// that never triggers a refresh on its own.
    async fn fetch(&self, max_age_ms: Option<u64>) -> Result<(Snapshot, bool, bool), CoreError> {
        match max_age_ms {
            None => {
                let reply = self.coordinator.get_status().await?;
                Ok((reply.snapshot, reply.stale, false))
            }
            Some(requested) => {
                let floor = self.config.min_ask_max_age_ms;
                let (effective, floor_applied) = if requested < floor {
                    (floor, true)
                } else {
                    (requested, false)
                };
                let reply = self
                    .coordinator
                    .get_status_with_freshness(effective)
                    .await?;
                Ok((reply.snapshot, reply.stale, floor_applied))
            }
        }
    }

    fn wrap(&self, snapshot: Snapshot, stale: bool, floor_applied: bool) -> ReadReply {
        let meta = Meta::build(&snapshot, self.clock.utc_now(), stale, floor_applied);
        ReadReply { snapshot, meta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::util::service_fn;
    use tube_core::{Disruption, EventListeners, LineRecord, TestClock};
    use tube_coordinator::CoordinatorConfig;
    use tube_gateway::{GatewayConfig, UpstreamError, UpstreamRequest};
    use tube_register::{NoopTransport, RegisterConfig};

    fn lines() -> Vec<LineRecord> {
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
                status: "Severe Delays".into(),
                status_description: "Severe Delays".into(),
                disruptions: vec![Disruption {
                    category: "signalFailure".into(),
                    description: "Signal failure at Brixton".into(),
                    planned: false,
                }],
            },
        ]
    }

    async fn build_fixture() -> (ReadApi, Arc<AtomicUsize>) {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let upstream = service_fn(move |_req: UpstreamRequest| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(lines())
            }
        });

        let (gw, _gw_join) = tube_gateway::spawn_with_upstream(
            GatewayConfig::builder("n1", "unused")
                .clock(Arc::clone(&clock))
                .build(),
            upstream,
            EventListeners::new(),
        );

        let (reg, _reg_join) = tube_register::spawn(
            RegisterConfig::builder("n1").build(),
            Arc::new(NoopTransport),
            EventListeners::new(),
            Arc::clone(&clock),
        );

        let (coordinator, _coord_join) = tube_coordinator::spawn(
            CoordinatorConfig::builder("n1").build(),
            gw.clone(),
            reg,
            EventListeners::new(),
            Arc::clone(&clock),
        );

        let api = ReadApi::new(
            coordinator,
            gw,
            crate::config::ReadApiConfig::builder().build(),
            Arc::clone(&clock),
        );

        (api, calls)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_all_status_returns_both_lines() {
        let (api, _calls) = build_fixture().await;
        let reply = api.get_all_status(Some(60_000)).await.unwrap();
        assert_eq!(reply.snapshot.lines.len(), 2);
        assert!(!reply.meta.floor_applied);
    }

    /// §8 P9: a request below the floor is clamped and flagged.
    #[tokio::test(flavor = "multi_thread")]
    async fn freshness_floor_clamps_low_requests() {
        let (api, _calls) = build_fixture().await;
        let reply = api.get_all_status(Some(0)).await.unwrap();
        assert!(reply.meta.floor_applied);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_line_status_is_case_insensitive() {
        let (api, _calls) = build_fixture().await;
        let reply = api.get_line_status("CENTRAL", Some(60_000)).await.unwrap();
        assert_eq!(reply.snapshot.lines.len(), 1);
        assert_eq!(reply.snapshot.lines[0].id, "central");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_line_status_unknown_line_is_not_found() {
        let (api, _calls) = build_fixture().await;
        let err = api
            .get_line_status("doesnotexist", Some(60_000))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_disruptions_filters_to_unplanned_only() {
        let (api, _calls) = build_fixture().await;
        let reply = api.get_disruptions(Some(60_000)).await.unwrap();
        assert_eq!(reply.snapshot.lines.len(), 1);
        assert_eq!(reply.snapshot.lines[0].id, "victoria");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn date_range_rejects_inverted_bounds() {
        let (api, _calls) = build_fixture().await;
        let from = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let err = api
            .get_line_status_date_range("central", from, to)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }
}
