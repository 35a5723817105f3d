use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const BUCKETS: &[f64] = &[
        1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .install_recorder()
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

// Shorthand for common metric types
pub fn inc(name: &'static str, labels: &[(String, String)], value: u64) {
    metrics::counter!(name, labels).increment(value);
}

pub fn histogram(name: &'static str, labels: &[(String, String)], value: f64) {
    metrics::histogram!(name, labels).record(value);
}

/// Labels for an access decision. `matched_scope` is `none` when nothing matched.
pub fn decision_labels(
    feature_key: &str,
    reason: &str,
    matched_scope: Option<&str>,
) -> Vec<(String, String)> {
    vec![
        ("feature_key".to_string(), feature_key.to_string()),
        ("reason".to_string(), reason.to_string()),
        (
            "matched_scope".to_string(),
            matched_scope.unwrap_or("none").to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_labels() {
        let labels = decision_labels("chat", "quota_exceeded", Some("global"));
        assert_eq!(
            labels,
            vec![
                ("feature_key".to_string(), "chat".to_string()),
                ("reason".to_string(), "quota_exceeded".to_string()),
                ("matched_scope".to_string(), "global".to_string()),
            ]
        );

        let labels = decision_labels("faq", "no_matching_rule", None);
        assert_eq!(labels[2].1, "none");
    }
}
