// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::ingest::extract::DEFAULT_ARTICLE_SELECTOR;
use crate::ingest::forward::DeliveryPolicy;
use crate::ingest::providers::rss::DEFAULT_ITEM_CAP;
use crate::ingest::providers::telegram::DEFAULT_API_BASE;
use crate::ingest::scheduler::OverlapPolicy;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const ENV_BACKEND_URL: &str = "BACKEND_URL";
pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECS";
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHANNEL: &str = "TELEGRAM_CHANNEL";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Body from the feed item itself.
    #[default]
    Summary,
    /// Follow the link and collect the article's paragraphs.
    FullArticle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssSourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mode: ExtractMode,
    #[serde(default = "default_article_selector")]
    pub article_selector: String,
    /// Overrides the global interval for this feed.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub item_cap: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_name")]
    pub name: String,
    /// "ENV" means: read from TELEGRAM_BOT_TOKEN
    pub bot_token: String,
    /// Numeric chat id (`-100…`) or public username (`@name`).
    pub channel: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_long_poll_secs")]
    pub long_poll_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub backend_url: String,
    pub poll_interval_secs: u64,
    pub item_cap: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub accept: String,
    /// Accept header for article pages.
    pub article_accept: String,
    pub accept_language: String,
    pub delivery_policy: DeliveryPolicy,
    /// Count any HTTP response from the backend as delivered.
    pub accept_any_status: bool,
    pub overlap: OverlapPolicy,
    /// Push-source queue depth.
    pub queue_capacity: usize,
    /// `host:port` for /metrics and /healthz; disabled when unset.
    pub metrics_addr: Option<String>,
    pub rss: Vec<RssSourceConfig>,
    pub telegram: Option<TelegramConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000/ai/new".to_string(),
            poll_interval_secs: 60,
            item_cap: DEFAULT_ITEM_CAP,
            request_timeout_secs: 30,
            user_agent: BROWSER_UA.to_string(),
            accept: "application/rss+xml, application/xml;q=0.9, */*;q=0.8".to_string(),
            article_accept: "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            delivery_policy: DeliveryPolicy::default(),
            accept_any_status: false,
            overlap: OverlapPolicy::default(),
            queue_capacity: 64,
            metrics_addr: None,
            rss: vec![
                RssSourceConfig {
                    name: "rbc".to_string(),
                    url: "https://rssexport.rbc.ru/rbcnews/news/30/full.rss".to_string(),
                    mode: ExtractMode::FullArticle,
                    article_selector: default_article_selector(),
                    interval_secs: None,
                    item_cap: None,
                },
                RssSourceConfig {
                    name: "vedomosti".to_string(),
                    url: "https://www.vedomosti.ru/rss/news".to_string(),
                    mode: ExtractMode::Summary,
                    article_selector: default_article_selector(),
                    interval_secs: None,
                    item_cap: None,
                },
            ],
            telegram: None,
        }
    }
}

fn default_article_selector() -> String {
    DEFAULT_ARTICLE_SELECTOR.to_string()
}
fn default_telegram_name() -> String {
    "telegram".to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_long_poll_secs() -> u64 {
    30
}
fn default_retry_delay_secs() -> u64 {
    5
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn interval_for(&self, feed: &RssSourceConfig) -> Duration {
        Duration::from_secs(feed.interval_secs.unwrap_or(self.poll_interval_secs))
    }

    pub fn cap_for(&self, feed: &RssSourceConfig) -> usize {
        feed.item_cap.unwrap_or(self.item_cap)
    }

    /// Env vars win over file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var(ENV_BACKEND_URL) {
            self.backend_url = url;
        }
        if let Ok(v) = env::var(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL}={v} is not a number"))?;
        }
        if let Ok(channel) = env::var(ENV_TELEGRAM_CHANNEL) {
            match self.telegram.as_mut() {
                Some(tg) => tg.channel = channel,
                None => {
                    self.telegram = Some(TelegramConfig {
                        name: default_telegram_name(),
                        bot_token: "ENV".to_string(),
                        channel,
                        api_base: default_api_base(),
                        long_poll_secs: default_long_poll_secs(),
                        retry_delay_secs: default_retry_delay_secs(),
                    })
                }
            }
        }
        if let (Ok(token), Some(tg)) = (env::var(ENV_TELEGRAM_TOKEN), self.telegram.as_mut()) {
            tg.bot_token = token;
        }
        Ok(())
    }

    /// Replace "ENV" placeholders with the real secret.
    pub fn resolve_secrets(&mut self) -> Result<()> {
        if let Some(tg) = self.telegram.as_mut() {
            if tg.bot_token.trim().eq_ignore_ascii_case("env") {
                tg.bot_token = env::var(ENV_TELEGRAM_TOKEN)
                    .map_err(|_| anyhow!("Missing {ENV_TELEGRAM_TOKEN} env var"))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.backend_url)
            .with_context(|| format!("invalid backend_url `{}`", self.backend_url))?;
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be > 0");
        }
        if self.item_cap == 0 {
            bail!("item_cap must be > 0");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be > 0");
        }

        let mut names = BTreeSet::new();
        for feed in &self.rss {
            if !names.insert(feed.name.as_str()) {
                bail!("duplicate source name `{}`", feed.name);
            }
            reqwest::Url::parse(&feed.url)
                .with_context(|| format!("invalid url for feed `{}`", feed.name))?;
            if feed.interval_secs == Some(0) || feed.item_cap == Some(0) {
                bail!("feed `{}`: interval and cap must be > 0", feed.name);
            }
        }
        if let Some(tg) = &self.telegram {
            if !names.insert(tg.name.as_str()) {
                bail!("duplicate source name `{}`", tg.name);
            }
            if tg.bot_token.trim().is_empty() || tg.channel.trim().is_empty() {
                bail!("telegram: bot_token and channel are required");
            }
        }
        Ok(())
    }
}

/// Load config from an explicit path. TOML or JSON, by extension.
pub fn load_config_from(path: &Path) -> Result<IngestConfig> {
    let mut cfg = read_config_file(path)?;
    cfg.resolve_secrets()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config using env var + fallbacks, then env overrides:
/// 1) $INGEST_CONFIG_PATH
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<IngestConfig> {
    let mut cfg = match env::var(ENV_CONFIG_PATH) {
        Ok(p) => {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            read_config_file(&pb)?
        }
        Err(_) => {
            let toml_p = PathBuf::from("config/ingest.toml");
            let json_p = PathBuf::from("config/ingest.json");
            if toml_p.exists() {
                read_config_file(&toml_p)?
            } else if json_p.exists() {
                read_config_file(&json_p)?
            } else {
                IngestConfig::default()
            }
        }
    };
    cfg.apply_env_overrides()?;
    cfg.resolve_secrets()?;
    cfg.validate()?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<IngestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg: IngestConfig = match ext.as_str() {
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
        _ => toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?,
    };
    Ok(cfg)
}
