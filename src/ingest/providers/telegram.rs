// src/ingest/providers/telegram.rs
//! Push source for a Telegram channel.
//!
//! Holds a Bot API long-poll session (`getUpdates`) open and turns every
//! `channel_post` from the subscribed channel into a [`RawItem`]. The bot has
//! to be a member of the channel to receive its posts.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::ingest::types::{PushSource, RawItem};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const TITLE_MAX_CHARS: usize = 120;

/// Which channel's posts are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Id(i64),
    Username(String),
}

impl ChannelFilter {
    /// `-1001234567890` → numeric id, `@rian_ru` / `rian_ru` → username.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<i64>() {
            Ok(id) => ChannelFilter::Id(id),
            Err(_) => ChannelFilter::Username(s.trim_start_matches('@').to_string()),
        }
    }

    pub fn matches(&self, chat: &Chat) -> bool {
        match self {
            ChannelFilter::Id(id) => chat.id == *id,
            ChannelFilter::Username(u) => chat
                .username
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(u)),
        }
    }

    /// Turn an update into a raw item if it is a post from this channel.
    pub fn accept(&self, update: &Update) -> Option<RawItem> {
        let post = update.channel_post.as_ref()?;
        if !self.matches(&post.chat) {
            return None;
        }
        Some(message_to_raw(post))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub channel_post: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

fn message_to_raw(msg: &Message) -> RawItem {
    let text = msg
        .text
        .as_deref()
        .or(msg.caption.as_deref())
        .unwrap_or_default()
        .to_string();

    let id = match msg.chat.username.as_deref() {
        Some(u) => format!("https://t.me/{u}/{}", msg.message_id),
        None => format!("{}:{}", msg.chat.id, msg.message_id),
    };

    let title = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(TITLE_MAX_CHARS).collect::<String>())
        .or_else(|| msg.chat.title.clone())
        .unwrap_or_default();

    let published_at = chrono::DateTime::from_timestamp(msg.date, 0)
        .map(|d| d.to_rfc2822())
        .unwrap_or_default();

    let mut raw = RawItem::new(id, title);
    raw.published_at = published_at;
    raw.link = msg
        .chat
        .username
        .as_ref()
        .map(|_| raw.id.clone());
    raw.description = Some(text);
    raw
}

/// No `Debug`: the token is part of every request URL.
#[derive(Clone)]
pub struct TelegramChannel {
    name: String,
    api_base: String,
    token: String,
    filter: ChannelFilter,
    client: reqwest::Client,
    long_poll: Duration,
    retry_delay: Duration,
}

impl TelegramChannel {
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        filter: ChannelFilter,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            filter,
            client,
            long_poll: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_long_poll(mut self, d: Duration) -> Self {
        self.long_poll = d;
        self
    }

    pub fn with_retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = d;
        self
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, FetchError> {
        let url = format!("{}/bot{}/getUpdates", self.api_base, self.token);
        let mut query = vec![
            ("timeout", self.long_poll.as_secs().to_string()),
            ("allowed_updates", r#"["channel_post"]"#.to_string()),
        ];
        if let Some(o) = offset {
            query.push(("offset", o.to_string()));
        }

        let rsp = self
            .client
            .get(url)
            .query(&query)
            // the server holds the request for up to `long_poll`
            .timeout(self.long_poll + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        let body: ApiResponse<Vec<Update>> = rsp
            .json()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;
        if !body.ok {
            return Err(FetchError::Api(
                body.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl PushSource for TelegramChannel {
    async fn subscribe(&self, tx: mpsc::Sender<RawItem>, stop: CancellationToken) {
        let mut offset: Option<i64> = None;
        tracing::info!(source = %self.name, filter = ?self.filter, "listening for channel posts");

        loop {
            let batch = tokio::select! {
                _ = stop.cancelled() => return,
                r = self.get_updates(offset) => r,
            };

            match batch {
                Ok(updates) => {
                    for u in updates {
                        offset = Some(u.update_id + 1);
                        let Some(raw) = self.filter.accept(&u) else {
                            tracing::trace!(source = %self.name, update = u.update_id, "update ignored");
                            continue;
                        };
                        if tx.send(raw).await.is_err() {
                            tracing::debug!(source = %self.name, "queue closed, ending subscription");
                            return;
                        }
                    }
                }
                Err(e) => {
                    counter!("ingest_fetch_errors_total").increment(1);
                    tracing::warn!(source = %self.name, error = %e, "getUpdates failed, retrying");
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
