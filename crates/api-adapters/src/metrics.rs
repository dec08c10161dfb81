//! Prometheus metrics exposed on `/metrics`.

use std::sync::atomic::AtomicI64;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

pub struct ApiMetrics {
    registry: Registry,
    pub comments_created: Counter,
    pub comments_rate_limited: Counter,
    pub tracked_identities: Gauge<i64, AtomicI64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let comments_created = Counter::default();
        let comments_rate_limited = Counter::default();
        let tracked_identities = Gauge::<i64, AtomicI64>::default();

        let mut registry = Registry::with_prefix("comments");
        registry.register("created", "Comments accepted and stored", comments_created.clone());
        registry.register(
            "rate_limited",
            "Comment attempts rejected by the per-identity limit",
            comments_rate_limited.clone(),
        );
        registry.register(
            "tracked_identities",
            "Identities currently held by the rate limiter",
            tracked_identities.clone(),
        );

        Self {
            registry,
            comments_created,
            comments_rate_limited,
            tracked_identities,
        }
    }

    /// OpenMetrics text exposition of every registered metric.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}
