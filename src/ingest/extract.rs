// src/ingest/extract.rs
use scraper::{Html, Selector};

use crate::error::ExtractError;
use crate::ingest::normalize_text;
use crate::ingest::types::{NormalizedItem, RawItem, SourceKind};

pub const NO_TEXT_PLACEHOLDER: &str = "No article text available.";
pub const NO_PARAGRAPHS_PLACEHOLDER: &str = "Could not extract article text.";
pub const LOAD_FAILED_PREFIX: &str = "Failed to load article:";

pub const DEFAULT_ARTICLE_SELECTOR: &str = "div.article__text p";

/// How a pipeline turns a raw item into a body.
#[derive(Debug, Clone)]
pub enum Extractor {
    /// Body from the feed's inline fields.
    Summary,
    /// Message text kept verbatim (channel posts are plain text, not markup).
    Text,
    /// Body from the paragraphs of the linked article page.
    FullArticle {
        client: reqwest::Client,
        selector: Selector,
    },
}

impl Extractor {
    pub fn full_article(client: reqwest::Client, selector: &str) -> Result<Self, ExtractError> {
        let selector =
            Selector::parse(selector).map_err(|_| ExtractError::Selector(selector.to_string()))?;
        Ok(Extractor::FullArticle { client, selector })
    }

    /// Never fails: extraction problems become a placeholder body.
    pub async fn extract(&self, raw: &RawItem, source: &str, kind: SourceKind) -> NormalizedItem {
        let body = match self {
            Extractor::Summary => summary_body(raw),
            Extractor::Text => raw
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            Extractor::FullArticle { client, selector } => {
                let url = raw.link.as_deref().unwrap_or(&raw.id);
                match fetch_article_text(client, url, selector).await {
                    Ok(text) => text,
                    Err(ExtractError::NoParagraphs) => {
                        metrics::counter!("ingest_extract_fallbacks_total").increment(1);
                        tracing::warn!(source, link = url, "no article paragraphs matched");
                        NO_PARAGRAPHS_PLACEHOLDER.to_string()
                    }
                    Err(e) => {
                        metrics::counter!("ingest_extract_fallbacks_total").increment(1);
                        tracing::warn!(source, link = url, error = %e, "article fetch failed");
                        format!("{LOAD_FAILED_PREFIX} {e}")
                    }
                }
            }
        };

        NormalizedItem {
            id: raw.id.clone(),
            title: raw.title.clone(),
            published_at: raw.published_at.clone(),
            body: non_empty_or(body, NO_TEXT_PLACEHOLDER),
            source: source.to_string(),
            kind,
        }
    }
}

/// description → content → content:encoded → placeholder.
pub fn summary_body(raw: &RawItem) -> String {
    [&raw.description, &raw.content, &raw.content_encoded]
        .into_iter()
        .flatten()
        .map(|s| normalize_text(s))
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| NO_TEXT_PLACEHOLDER.to_string())
}

pub async fn fetch_article_text(
    client: &reqwest::Client,
    url: &str,
    selector: &Selector,
) -> Result<String, ExtractError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ExtractError::Status {
            status: status.as_u16(),
        });
    }
    let html = resp.text().await?;
    paragraphs_text(&html, selector)
}

/// Text of every element matching `selector`, each trimmed, newline-joined.
pub fn paragraphs_text(html: &str, selector: &Selector) -> Result<String, ExtractError> {
    let doc = Html::parse_document(html);
    let joined = doc
        .select(selector)
        .map(|el| el.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if joined.is_empty() {
        Err(ExtractError::NoParagraphs)
    } else {
        Ok(joined)
    }
}

fn non_empty_or(s: String, fallback: &str) -> String {
    if s.trim().is_empty() {
        fallback.to_string()
    } else {
        s
    }
}
