//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use mockito::{Matcher, Server};
use pvmon_metrics::{MetricLine, MetricsSink, RetryingSink, SinkError, VictoriaMetricsSink};
use pvmon_rt::{shutdown_channel, RetryPolicy};

const IMPORT_PATH: &str = "/api/v1/import/prometheus";

fn batch() -> Vec<MetricLine> {
    vec![
        MetricLine::new("solar_ghi_wm2", 812.5, 1_717_243_200_000).label("source", "file"),
        MetricLine::new("pv_real_kw", 101.23456, 1_717_243_200_000)
            .label("inverter", "1")
            .precision(3),
    ]
}

#[tokio::test]
async fn posts_text_lines() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", IMPORT_PATH)
        .match_header("content-type", "text/plain")
        .match_body(Matcher::Exact(
            "solar_ghi_wm2{source=\"file\"} 812.5 1717243200000\n\
             pv_real_kw{inverter=\"1\"} 101.235 1717243200000\n"
                .to_owned(),
        ))
        .with_status(204)
        .create_async()
        .await;

    let sink = VictoriaMetricsSink::new(
        format!("{}{}", server.url(), IMPORT_PATH),
        Duration::from_secs(2),
    )
    .unwrap();
    sink.publish(&batch()).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_batch_is_not_sent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", IMPORT_PATH)
        .expect(0)
        .create_async()
        .await;
    let sink = VictoriaMetricsSink::new(
        format!("{}{}", server.url(), IMPORT_PATH),
        Duration::from_secs(2),
    )
    .unwrap();
    sink.publish(&[]).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_batch_reports_status() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", IMPORT_PATH)
        .with_status(400)
        .with_body("cannot parse line")
        .create_async()
        .await;
    let sink = VictoriaMetricsSink::new(
        format!("{}{}", server.url(), IMPORT_PATH),
        Duration::from_secs(2),
    )
    .unwrap();
    let err = sink.publish(&batch()).await.unwrap_err();
    match err {
        SinkError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "cannot parse line");
        }
        other => panic!("unexpected error {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn retrying_sink_retries_server_errors_only() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", IMPORT_PATH)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;
    let (_trigger, listener) = shutdown_channel();
    let sink = RetryingSink::new(
        VictoriaMetricsSink::new(
            format!("{}{}", server.url(), IMPORT_PATH),
            Duration::from_secs(2),
        )
        .unwrap(),
        RetryPolicy::new(3, Duration::from_millis(5), Duration::ZERO),
        listener,
    );
    let err = sink.publish(&batch()).await.unwrap_err();
    assert!(matches!(err, SinkError::Status { status: 503, .. }));
    failing.assert_async().await;
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let sink = VictoriaMetricsSink::new("http://127.0.0.1:9/import", Duration::from_millis(500)).unwrap();
    let err = sink.publish(&batch()).await.unwrap_err();
    assert!(matches!(err, SinkError::Transport(_)));
    assert!(err.is_retryable());
}
