//! Prometheus metrics

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Counters shared by the API and the worker pool
pub struct Metrics {
    registry: Registry,
    pub jobs_enqueued: IntCounter,
    pub jobs_finished: IntCounter,
    pub jobs_failed: IntCounter,
    pub jobs_requeued: IntCounter,
    pub search_requests: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let jobs_enqueued = IntCounter::new("docgate_jobs_enqueued_total", "Jobs accepted into the queue")?;
        let jobs_finished = IntCounter::new("docgate_jobs_finished_total", "Jobs that returned a result")?;
        let jobs_failed = IntCounter::new("docgate_jobs_failed_total", "Jobs that failed terminally")?;
        let jobs_requeued = IntCounter::new(
            "docgate_jobs_requeued_total",
            "Jobs put back in the queue for another attempt",
        )?;
        let search_requests = IntCounter::new("docgate_search_requests_total", "Search requests served")?;

        registry.register(Box::new(jobs_enqueued.clone()))?;
        registry.register(Box::new(jobs_finished.clone()))?;
        registry.register(Box::new(jobs_failed.clone()))?;
        registry.register(Box::new(jobs_requeued.clone()))?;
        registry.register(Box::new(search_requests.clone()))?;

        Ok(Self {
            registry,
            jobs_enqueued,
            jobs_finished,
            jobs_failed,
            jobs_requeued,
            search_requests,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.jobs_enqueued.inc();
        metrics.jobs_enqueued.inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("docgate_jobs_enqueued_total 2"));
        assert!(text.contains("docgate_search_requests_total 0"));
    }
}
