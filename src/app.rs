// src/app.rs
//! Turns an [`IngestConfig`] into running pipelines, one per source.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ExtractMode, IngestConfig, RssSourceConfig, TelegramConfig};
use crate::ingest::extract::Extractor;
use crate::ingest::forward::Forwarder;
use crate::ingest::providers::{ChannelFilter, RssProvider, TelegramChannel};
use crate::ingest::scheduler::{spawn_poll_scheduler, spawn_push_pipeline};
use crate::ingest::types::SourceKind;
use crate::ingest::SourcePipeline;

/// HTTP client with the browser-like identity feeds insist on.
pub fn http_client(cfg: &IngestConfig) -> Result<reqwest::Client> {
    client_accepting(cfg, &cfg.accept)
}

/// Same identity, but asking for HTML: article pages, not feeds.
pub fn article_client(cfg: &IngestConfig) -> Result<reqwest::Client> {
    client_accepting(cfg, &cfg.article_accept)
}

fn client_accepting(cfg: &IngestConfig, accept: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_str(accept).context("invalid accept header")?,
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&cfg.accept_language).context("invalid accept_language header")?,
    );
    reqwest::Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .default_headers(headers)
        .timeout(cfg.request_timeout())
        .build()
        .context("building http client")
}

fn forwarder(cfg: &IngestConfig, client: reqwest::Client) -> Forwarder {
    Forwarder::new(cfg.backend_url.clone(), client).with_accept_any_status(cfg.accept_any_status)
}

/// Pipeline + source for one feed.
pub fn build_rss(
    cfg: &IngestConfig,
    feed: &RssSourceConfig,
) -> Result<(Arc<SourcePipeline>, Arc<RssProvider>)> {
    let client = http_client(cfg)?;
    let extractor = match feed.mode {
        ExtractMode::Summary => Extractor::Summary,
        ExtractMode::FullArticle => {
            Extractor::full_article(article_client(cfg)?, &feed.article_selector)
                .with_context(|| format!("feed `{}`", feed.name))?
        }
    };
    let pipeline = SourcePipeline::new(
        feed.name.clone(),
        SourceKind::Rss,
        extractor,
        forwarder(cfg, client.clone()),
    )
    .with_policy(cfg.delivery_policy);
    let provider = RssProvider::from_url(feed.name.clone(), feed.url.clone(), client)
        .with_cap(cfg.cap_for(feed));
    Ok((Arc::new(pipeline), Arc::new(provider)))
}

/// Pipeline + subscription for the Telegram channel.
pub fn build_telegram(
    cfg: &IngestConfig,
    tg: &TelegramConfig,
) -> Result<(Arc<SourcePipeline>, Arc<TelegramChannel>)> {
    let client = http_client(cfg)?;
    let pipeline = SourcePipeline::new(
        tg.name.clone(),
        SourceKind::Channel,
        Extractor::Text,
        forwarder(cfg, client.clone()),
    )
    .with_policy(cfg.delivery_policy);
    let channel = TelegramChannel::new(
        tg.name.clone(),
        tg.bot_token.clone(),
        ChannelFilter::parse(&tg.channel),
        client,
    )
    .with_api_base(tg.api_base.clone())
    .with_long_poll(Duration::from_secs(tg.long_poll_secs))
    .with_retry_delay(Duration::from_secs(tg.retry_delay_secs));
    Ok((Arc::new(pipeline), Arc::new(channel)))
}

/// Build and start every configured source. All tasks end when `stop` fires.
/// Nothing is spawned unless every source builds.
pub fn spawn_all(cfg: &IngestConfig, stop: &CancellationToken) -> Result<Vec<JoinHandle<()>>> {
    let feeds = cfg
        .rss
        .iter()
        .map(|feed| Ok((build_rss(cfg, feed)?, cfg.interval_for(feed))))
        .collect::<Result<Vec<_>>>()?;
    let channel = cfg
        .telegram
        .as_ref()
        .map(|tg| build_telegram(cfg, tg))
        .transpose()?;

    let mut handles = Vec::new();
    for ((pipeline, provider), interval) in feeds {
        handles.push(spawn_poll_scheduler(
            pipeline,
            provider,
            interval,
            cfg.overlap,
            stop.child_token(),
        ));
    }
    if let Some((pipeline, channel)) = channel {
        handles.push(spawn_push_pipeline(
            pipeline,
            channel,
            cfg.queue_capacity,
            stop.child_token(),
        ));
    }

    tracing::info!(
        sources = handles.len(),
        backend = %cfg.backend_url,
        "ingest pipelines started"
    );
    Ok(handles)
}
