//! Prometheus metrics for the prober, served on `GET /metrics`

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge, TextEncoder,
};
use tracing::{event, Level};

lazy_static::lazy_static! {
    /// Requests served, by route and outcome (success/fail)
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "http_requests_total",
        "Total number of requests",
        &["path", "status"]
    ).unwrap();

    pub static ref HTTP_RESPONSE_TIME: HistogramVec = register_histogram_vec!(
        "http_response_time_milliseconds",
        "Duration of HTTP requests in milliseconds",
        &["path"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    ).unwrap();

    /// Nodes currently tracked by the poller
    pub static ref KNOWN_NODES: IntGauge = register_int_gauge!(
        "cassprober_known_nodes",
        "Number of Cassandra nodes currently tracked"
    ).unwrap();

    /// JMX fetches, by outcome (success/fail)
    pub static ref JMX_FETCHES: CounterVec = register_counter_vec!(
        "cassprober_jmx_fetches_total",
        "Total number of failure detector fetches through jolokia",
        &["result"]
    ).unwrap();
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "fail"
    }
}

pub fn record_jmx_fetch(success: bool) {
    JMX_FETCHES.with_label_values(&[outcome(success)]).inc();
}

pub fn set_known_nodes(count: usize) {
    KNOWN_NODES.set(count as i64);
}

/// Records request count and latency for every routed request.
/// Requests are labeled by their route template (`/healthz/:broadcastip`) rather than the raw path.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => request.uri().path().to_string(),
    };

    let start = Instant::now();
    let response = next.run(request).await;
    let millis = start.elapsed().as_secs_f64() * 1000.0;

    let status = response.status();
    let success = status.is_informational() || status.is_success();
    HTTP_RESPONSE_TIME
        .with_label_values(&[path.as_str()])
        .observe(millis);
    HTTP_REQUESTS
        .with_label_values(&[path.as_str(), outcome(success)])
        .inc();

    response
}

/// Encodes every registered collector in the prometheus text format
pub async fn render() -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            event!(Level::ERROR, "unable to encode metrics: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
