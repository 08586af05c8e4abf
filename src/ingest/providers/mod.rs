// src/ingest/providers/mod.rs
pub mod rss;
pub mod telegram;

pub use rss::RssProvider;
pub use telegram::{ChannelFilter, TelegramChannel};
