// src/ingest/types.rs
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    Channel,
}

/// Record as the source delivered it. Lives for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub id: String, // link or platform message id, the dedup key
    pub title: String,
    pub published_at: String, // source-formatted
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub content_encoded: Option<String>,
}

impl RawItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            published_at: String::new(),
            link: None,
            description: None,
            content: None,
            content_encoded: None,
        }
    }
}

/// What the backend receives. `body` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub id: String,
    pub title: String,
    pub published_at: String,
    pub body: String,
    pub source: String,
    pub kind: SourceKind,
}

/// Pull source: one finite batch per cycle.
#[async_trait::async_trait]
pub trait PollSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>, FetchError>;
    fn name(&self) -> &str;
}

/// Push source: holds a subscription open and enqueues every accepted event
/// until `stop` fires. Returns only on stop or when the queue closes.
#[async_trait::async_trait]
pub trait PushSource: Send + Sync {
    async fn subscribe(&self, tx: mpsc::Sender<RawItem>, stop: CancellationToken);
    fn name(&self) -> &str;
}
