// src/ingest/providers/rss.rs
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{PollSource, RawItem};

pub const DEFAULT_ITEM_CAP: usize = 3;

/// Direct children of `<item>` we keep. Matched on the qualified name, so
/// `atom:link` or `media:content` never land in `link` / `content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    PubDate,
    Description,
    Content,
    ContentEncoded,
}

impl Field {
    fn from_qname(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"title" => Field::Title,
            b"link" => Field::Link,
            b"guid" => Field::Guid,
            b"pubDate" => Field::PubDate,
            b"description" => Field::Description,
            b"content" => Field::Content,
            b"content:encoded" => Field::ContentEncoded,
            _ => return None,
        })
    }
}

#[derive(Debug, Default)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    pub_date: Option<String>,
    description: Option<String>,
    content: Option<String>,
    content_encoded: Option<String>,
}

impl Item {
    fn slot(&mut self, f: Field) -> &mut Option<String> {
        match f {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Guid => &mut self.guid,
            Field::PubDate => &mut self.pub_date,
            Field::Description => &mut self.description,
            Field::Content => &mut self.content,
            Field::ContentEncoded => &mut self.content_encoded,
        }
    }

    fn push_text(&mut self, f: Field, text: &str) {
        self.slot(f).get_or_insert_with(String::new).push_str(text);
    }
}

/// Polled RSS feed. Keeps the first `cap` items in feed order.
pub struct RssProvider {
    name: String,
    cap: usize,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    /// `client` carries the user agent and Accept headers the feed expects.
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            cap: DEFAULT_ITEM_CAP,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            cap: DEFAULT_ITEM_CAP,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    pub fn parse_items(&self, xml: &str) -> Result<Vec<RawItem>, FetchError> {
        parse_feed(&self.name, xml, self.cap)
    }
}

#[async_trait]
impl PollSource for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let resp = client.get(url.as_str()).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                    });
                }
                let body = resp.text().await?;
                self.parse_items(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse an RSS document into at most `cap` raw items, feed order kept.
/// Items with neither link nor guid have no identity and are dropped.
pub fn parse_feed(source: &str, xml: &str, cap: usize) -> Result<Vec<RawItem>, FetchError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let items = read_items(&xml_clean, cap)?;

    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let link = it.link.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let guid = it.guid.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let Some(id) = link.clone().or(guid) else {
            tracing::warn!(source, title = ?it.title, "feed item without link or guid, skipped");
            continue;
        };

        out.push(RawItem {
            id,
            title: it.title.as_deref().map(normalize_text).unwrap_or_default(),
            published_at: it.pub_date.map(|s| s.trim().to_string()).unwrap_or_default(),
            link,
            description: it.description,
            content: it.content,
            content_encoded: it.content_encoded,
        });
    }
    Ok(out)
}

/// Walk the document and collect the first `cap` `<item>`s. Anything that is
/// not a known direct child of an item is skipped, wherever it appears.
fn read_items(xml: &str, cap: usize) -> Result<Vec<Item>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut saw_channel = false;
    // depth of the open <item> and what was read from it so far
    let mut current: Option<(usize, Item)> = None;
    let mut capture: Option<Field> = None;
    let mut out = Vec::new();

    loop {
        let ev = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "{e} (at byte {})",
                    reader.buffer_position()
                )))
            }
        };

        match ev {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                match (name.as_ref(), current.as_mut()) {
                    (b"channel", None) => saw_channel = true,
                    (b"item", None) => current = Some((depth, Item::default())),
                    (qname, Some((item_depth, item))) if depth == *item_depth + 1 => {
                        // repeated fields: first one wins
                        capture = Field::from_qname(qname).filter(|f| item.slot(*f).is_none());
                        if let Some(f) = capture {
                            *item.slot(f) = Some(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                let item_depth = current.as_ref().map(|(d, _)| *d);
                if item_depth == Some(depth) {
                    capture = None;
                    if let Some((_, item)) = current.take() {
                        out.push(item);
                    }
                    if out.len() >= cap {
                        break;
                    }
                } else if item_depth.map(|d| d + 1) == Some(depth) {
                    capture = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(t) => {
                if let (Some(f), Some((_, item))) = (capture, current.as_mut()) {
                    // unknown entities stay literal; normalize_text decodes them later
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    item.push_text(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(f), Some((_, item))) = (capture, current.as_mut()) {
                    item.push_text(f, &String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(FetchError::Parse("no <channel> element".to_string()));
    }
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
