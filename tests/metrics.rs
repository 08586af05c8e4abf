// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use news_ingester::ingest::extract::Extractor;
use news_ingester::ingest::forward::Forwarder;
use news_ingester::ingest::providers::RssProvider;
use news_ingester::metrics::Metrics;
use news_ingester::{SourceKind, SourcePipeline};
use tower::ServiceExt;

const FEED: &str = r#"<rss><channel><title>t</title>
<item><title>A</title><link>https://n.test/a</link><description>a</description></item>
</channel></rss>"#;

async fn get_text(app: axum::Router, path: &str) -> (StatusCode, String) {
    let resp = app
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

// One test per process: the recorder is global.
#[tokio::test]
async fn exposition_contains_ingest_series() {
    let m = Metrics::init().unwrap();
    let app = m.router();

    let (status, body) = get_text(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    // backend on a closed port: one fresh item, one delivery error
    let pipeline = SourcePipeline::new(
        "metrics",
        SourceKind::Rss,
        Extractor::Summary,
        Forwarder::new("http://127.0.0.1:9/news", reqwest::Client::new()),
    );
    let report = pipeline
        .run_cycle(&RssProvider::from_fixture("metrics", FEED))
        .await;
    assert_eq!(report.failed, 1);

    let (status, text) = get_text(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    for needle in [
        "ingest_cycles_total",
        "ingest_fetched_total",
        "ingest_fresh_total",
        "ingest_delivery_errors_total",
        "ingest_cycle_ms",
        "ingest_last_cycle_ts",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    // the recorder actually received the values, not just the names
    assert!(
        text.lines().any(|l| l == "ingest_fetched_total 1"),
        "{text}"
    );
    assert!(
        text.lines().any(|l| l == "ingest_delivery_errors_total 1"),
        "{text}"
    );
}
