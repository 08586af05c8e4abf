// tests/common/mod.rs
// In-process stand-ins for feeds, article pages and the backend.
#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// URL on a port nobody listens on.
pub async fn dead_url(path: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}

pub fn rss_xml(items: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (i, (title, link)) in items.iter().enumerate() {
        body.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link>\
             <pubDate>Mon, 06 Oct 2025 09:0{i}:00 +0300</pubDate>\
             <description>Summary of {title}</description></item>"
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test</title>{body}</channel></rss>"#
    )
}

// ---- backend ----

#[derive(Clone, Default)]
pub struct Backend {
    received: Arc<Mutex<Vec<serde_json::Value>>>,
    content_types: Arc<Mutex<Vec<String>>>,
    status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
    pub url: String,
}

impl Backend {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_delay(&self, d: Duration) {
        self.delay_ms.store(d.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.content_types.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|v| v["link"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn backend_post(
    State(b): State<Backend>,
    headers: HeaderMap,
    Json(v): Json<serde_json::Value>,
) -> StatusCode {
    let delay = b.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let ct = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    b.content_types.lock().unwrap().push(ct);
    b.received.lock().unwrap().push(v);
    StatusCode::from_u16(b.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

pub async fn spawn_backend() -> Backend {
    let mut b = Backend::default();
    b.set_status(200);
    let addr = serve(
        Router::new()
            .route("/news", post(backend_post))
            .with_state(b.clone()),
    )
    .await;
    b.url = format!("http://{addr}/news");
    b
}

// ---- feed + article pages ----

#[derive(Clone, Default)]
pub struct FeedServer {
    xml: Arc<Mutex<String>>,
    hits: Arc<AtomicUsize>,
    delay_ms: Arc<AtomicU64>,
    feed_accepts: Arc<Mutex<Vec<String>>>,
    article_accepts: Arc<Mutex<Vec<String>>>,
    pub base: String,
}

impl FeedServer {
    pub fn set_xml(&self, xml: String) {
        *self.xml.lock().unwrap() = xml;
    }

    pub fn set_delay(&self, d: Duration) {
        self.delay_ms.store(d.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Accept headers seen on feed requests.
    pub fn feed_accepts(&self) -> Vec<String> {
        self.feed_accepts.lock().unwrap().clone()
    }

    /// Accept headers seen on article page requests.
    pub fn article_accepts(&self) -> Vec<String> {
        self.article_accepts.lock().unwrap().clone()
    }

    pub fn feed_url(&self) -> String {
        format!("{}/rss", self.base)
    }

    pub fn article_url(&self, id: &str) -> String {
        format!("{}/article/{id}", self.base)
    }
}

fn accept_of(headers: &HeaderMap) -> String {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn feed(State(f): State<FeedServer>, headers: HeaderMap) -> impl IntoResponse {
    f.hits.fetch_add(1, Ordering::SeqCst);
    f.feed_accepts.lock().unwrap().push(accept_of(&headers));
    let delay = f.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let xml = f.xml.lock().unwrap().clone();
    ([(header::CONTENT_TYPE, "application/rss+xml")], xml)
}

async fn article(
    State(f): State<FeedServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    f.article_accepts.lock().unwrap().push(accept_of(&headers));
    match id.as_str() {
        "missing" => (StatusCode::NOT_FOUND, "gone").into_response(),
        "bare" => axum::response::Html("<html><body><p>no container</p></body></html>")
            .into_response(),
        _ => axum::response::Html(format!(
            r#"<html><body><div class="article__text">
                 <p> Lead for {id}. </p>
                 <p>Second paragraph.</p>
               </div></body></html>"#
        ))
        .into_response(),
    }
}

pub async fn spawn_feed(xml: String) -> FeedServer {
    let mut f = FeedServer::default();
    f.set_xml(xml);
    let addr = serve(
        Router::new()
            .route("/rss", get(feed))
            .route("/article/{id}", get(article))
            .with_state(f.clone()),
    )
    .await;
    f.base = format!("http://{addr}");
    f
}

/// Poll `cond` every 20ms for up to `within`.
pub async fn wait_for(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
