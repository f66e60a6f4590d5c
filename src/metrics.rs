use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and publish static config
    /// gauges. Counters (`spamshield_evaluations_total`,
    /// `spamshield_spam_blocked_total`, `spamshield_ai_degraded_total`)
    /// register lazily on first increment.
    pub fn init(spam_threshold: u32, ai_cache_ttl_secs: u64) -> Self {
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        gauge!("spamshield_spam_threshold").set(spam_threshold as f64);
        gauge!("spamshield_ai_cache_ttl_secs").set(ai_cache_ttl_secs as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
