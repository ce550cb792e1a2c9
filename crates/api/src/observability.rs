use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const HTTP_REQUESTS_TOTAL: &str = "lostfound_api_http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "lostfound_api_http_request_duration_seconds";
const HTTP_REQUEST_ERRORS_TOTAL: &str = "lostfound_api_http_errors_total";
const PROXIMITY_SEARCHES_TOTAL: &str = "lostfound_api_proximity_searches_total";
const PROXIMITY_RESULTS: &str = "lostfound_api_proximity_results";
const MEETUP_RESOLUTIONS_TOTAL: &str = "lostfound_api_meetup_resolutions_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn register_http_request(method: &str, route: &str, status: StatusCode, elapsed: Duration) {
    let status_code = status.as_u16().to_string();
    let result = if status.is_server_error() {
        "error"
    } else {
        "success"
    };

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone(),
        "result" => result
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status_code.clone()
    )
    .record(elapsed.as_secs_f64());

    if status.is_server_error() {
        counter!(
            HTTP_REQUEST_ERRORS_TOTAL,
            "method" => method.to_string(),
            "route" => route.to_string(),
            "status" => status_code
        )
        .increment(1);
    }
}

/// `origin` is `point` for coordinate searches and `item` for searches
/// around a stored report.
pub fn register_proximity_search(origin: &'static str, result_count: usize) {
    counter!(PROXIMITY_SEARCHES_TOTAL, "origin" => origin).increment(1);
    histogram!(PROXIMITY_RESULTS, "origin" => origin).record(result_count as f64);
}

pub fn register_meetup_resolution(outcome: &'static str, result: &'static str) {
    counter!(
        MEETUP_RESOLUTIONS_TOTAL,
        "outcome" => outcome,
        "result" => result
    )
    .increment(1);
}
