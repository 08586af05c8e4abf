// tests/ingest_channel.rs
mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use common::{serve, spawn_backend, wait_for};
use news_ingester::ingest::extract::Extractor;
use news_ingester::ingest::forward::Forwarder;
use news_ingester::ingest::providers::{ChannelFilter, TelegramChannel};
use news_ingester::ingest::scheduler::spawn_push_pipeline;
use news_ingester::{SourceKind, SourcePipeline};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct FakeBotApi {
    offsets: Arc<Mutex<Vec<Option<String>>>>,
    calls: Arc<AtomicUsize>,
}

fn post(update_id: i64, chat_id: i64, username: &str, message_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "channel_post": {
            "message_id": message_id,
            "date": 1_700_000_000,
            "chat": {"id": chat_id, "type": "channel", "username": username, "title": "Channel"},
            "text": text,
        }
    })
}

async fn get_updates(
    State(api): State<FakeBotApi>,
    Path(bot): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    api.calls.fetch_add(1, Ordering::SeqCst);
    if bot != "botgood-token" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
        );
    }

    let offset = q.get("offset").cloned();
    api.offsets.lock().unwrap().push(offset.clone());
    let result = match offset.as_deref() {
        None => json!([
            post(1, -100123, "rian_ru", 77, "Headline one\nBody"),
            post(2, -100999, "someone_else", 5, "not ours"),
            {"update_id": 3, "message": {"message_id": 9, "date": 1_700_000_000}},
        ]),
        Some("4") => json!([
            // re-sent post must not be forwarded twice
            post(4, -100123, "rian_ru", 77, "Headline one\nBody"),
            post(5, -100123, "rian_ru", 78, "Headline two"),
        ]),
        _ => {
            tokio::time::sleep(Duration::from_millis(50)).await;
            json!([])
        }
    };
    (StatusCode::OK, Json(json!({"ok": true, "result": result})))
}

async fn spawn_bot_api() -> (FakeBotApi, String) {
    let api = FakeBotApi::default();
    let addr = serve(
        Router::new()
            .route("/{bot}/getUpdates", get(get_updates))
            .with_state(api.clone()),
    )
    .await;
    (api, format!("http://{addr}"))
}

fn channel(base: &str, token: &str) -> TelegramChannel {
    TelegramChannel::new(
        "telegram",
        token,
        ChannelFilter::parse("@rian_ru"),
        reqwest::Client::new(),
    )
    .with_api_base(base)
    .with_long_poll(Duration::from_secs(1))
    .with_retry_delay(Duration::from_millis(50))
}

fn pipeline(backend_url: &str) -> Arc<SourcePipeline> {
    Arc::new(SourcePipeline::new(
        "telegram",
        SourceKind::Channel,
        Extractor::Text,
        Forwarder::new(backend_url, reqwest::Client::new()),
    ))
}

#[tokio::test]
async fn channel_posts_are_forwarded_once() {
    let (api, base) = spawn_bot_api().await;
    let backend = spawn_backend().await;
    let stop = CancellationToken::new();

    let handle = spawn_push_pipeline(
        pipeline(&backend.url),
        Arc::new(channel(&base, "good-token")),
        8,
        stop.clone(),
    );

    assert!(wait_for(Duration::from_secs(3), || backend.received().len() >= 2).await);
    // give a duplicate time to show up if it were going to
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.cancel();
    handle.await.unwrap();

    assert_eq!(
        backend.links(),
        vec!["https://t.me/rian_ru/77", "https://t.me/rian_ru/78"]
    );
    let first = &backend.received()[0];
    assert_eq!(first["title"], "Headline one");
    assert_eq!(first["text"], "Headline one\nBody");
    assert_eq!(first["pubDate"], "Tue, 14 Nov 2023 22:13:20 +0000");

    let offsets = api.offsets.lock().unwrap().clone();
    assert_eq!(offsets[0], None);
    assert_eq!(offsets[1].as_deref(), Some("4"));
    assert_eq!(offsets[2].as_deref(), Some("6"));
}

#[tokio::test]
async fn rejected_token_keeps_retrying_until_stopped() {
    let (api, base) = spawn_bot_api().await;
    let backend = spawn_backend().await;
    let stop = CancellationToken::new();

    let handle = spawn_push_pipeline(
        pipeline(&backend.url),
        Arc::new(channel(&base, "bad-token")),
        8,
        stop.clone(),
    );

    assert!(wait_for(Duration::from_secs(3), || api.calls.load(Ordering::SeqCst) >= 3).await);
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("push pipeline did not stop")
        .unwrap();
    assert!(backend.received().is_empty());
}

#[tokio::test]
async fn get_updates_surfaces_api_errors() {
    let (_api, base) = spawn_bot_api().await;
    let err = channel(&base, "bad-token")
        .get_updates(None)
        .await
        .err()
        .expect("bad token must fail");
    assert!(err.to_string().contains("Unauthorized"), "{err}");
}
