//! Prometheus metrics for searches, collection runs, provider requests and cache upkeep.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus exporter listening on `addr`. Idempotent.
pub fn init_metrics(addr: &str) {
    INIT.call_once(|| {
        let addr: SocketAddr = match addr.parse() {
            Ok(a) => a,
            Err(_) => {
                warn!("Invalid metrics addr '{}', metrics exporter disabled", addr);
                return;
            }
        };
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

pub fn search_completed(source: &'static str, results: usize, duration_secs: f64) {
    ::metrics::counter!("playscanner_search_requests_total", "source" => source).increment(1);
    ::metrics::histogram!("playscanner_search_duration_seconds", "source" => source)
        .record(duration_secs);
    ::metrics::histogram!("playscanner_search_results").record(results as f64);
}

pub fn search_rejected(code: &'static str) {
    ::metrics::counter!("playscanner_search_rejected_total", "code" => code).increment(1);
}

pub fn collection_run(status: &'static str, slots: usize) {
    ::metrics::counter!("playscanner_collection_runs_total", "status" => status).increment(1);
    ::metrics::counter!("playscanner_slots_collected_total").increment(slots as u64);
}

pub fn provider_request(provider: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "error" };
    ::metrics::counter!("playscanner_provider_requests_total", "provider" => provider, "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("playscanner_provider_request_duration_seconds", "provider" => provider)
        .record(duration_secs);
}

pub fn cache_cleanup(removed: usize) {
    ::metrics::counter!("playscanner_cache_entries_expired_total").increment(removed as u64);
}
