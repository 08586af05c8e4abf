// src/ingest/mod.rs
pub mod dedup;
pub mod extract;
pub mod forward;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::dedup::SeenSet;
use crate::ingest::extract::Extractor;
use crate::ingest::forward::{DeliveryPolicy, Forwarder};
use crate::ingest::types::{PollSource, RawItem, SourceKind};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Cycles run, across all sources.");
        describe_counter!("ingest_fetched_total", "Raw items returned by sources.");
        describe_counter!("ingest_fresh_total", "Items not seen before in this process.");
        describe_counter!("ingest_delivered_total", "Items accepted by the backend.");
        describe_counter!(
            "ingest_delivery_errors_total",
            "Backend unreachable or rejecting."
        );
        describe_counter!("ingest_fetch_errors_total", "Source fetch/parse errors.");
        describe_counter!(
            "ingest_skipped_ticks_total",
            "Ticks dropped because the previous cycle was still running."
        );
        describe_counter!(
            "ingest_extract_fallbacks_total",
            "Items forwarded with a placeholder body."
        );
        describe_histogram!("ingest_cycle_ms", "Cycle duration in milliseconds.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts of the last finished cycle.");
    });
}

/// Decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub fresh: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Duplicate,
    Delivered,
    Failed,
}

/// Everything one source needs to run its cycles. Owned by that source's
/// scheduler; nothing in here is shared with other sources.
#[derive(Debug)]
pub struct SourcePipeline {
    name: String,
    kind: SourceKind,
    extractor: Extractor,
    forwarder: Forwarder,
    policy: DeliveryPolicy,
    seen: SeenSet,
}

impl SourcePipeline {
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        extractor: Extractor,
        forwarder: Forwarder,
    ) -> Self {
        ensure_metrics_described();
        Self {
            name: name.into(),
            kind,
            extractor,
            forwarder,
            policy: DeliveryPolicy::default(),
            seen: SeenSet::new(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Fetch → dedup → extract → forward, once. Fetch errors are logged and
    /// yield an empty report; nothing here returns an error.
    pub async fn run_cycle(&self, source: &dyn PollSource) -> CycleReport {
        let t0 = std::time::Instant::now();
        counter!("ingest_cycles_total").increment(1);

        let raw = match source.fetch_latest().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "fetch failed, skipping cycle");
                counter!("ingest_fetch_errors_total").increment(1);
                self.finish(t0);
                return CycleReport::default();
            }
        };

        let mut report = CycleReport {
            fetched: raw.len(),
            ..Default::default()
        };
        counter!("ingest_fetched_total").increment(raw.len() as u64);

        for item in raw {
            match self.process_item(item).await {
                ItemOutcome::Duplicate => {}
                ItemOutcome::Delivered => {
                    report.fresh += 1;
                    report.delivered += 1;
                }
                ItemOutcome::Failed => {
                    report.fresh += 1;
                    report.failed += 1;
                }
            }
        }

        if report.fresh == 0 {
            tracing::debug!(source = %self.name, fetched = report.fetched, "no new items");
        } else {
            tracing::info!(
                source = %self.name,
                fetched = report.fetched,
                fresh = report.fresh,
                delivered = report.delivered,
                failed = report.failed,
                "cycle finished"
            );
        }
        self.finish(t0);
        report
    }

    /// Dedup → extract → forward for a single raw item.
    pub async fn process_item(&self, raw: RawItem) -> ItemOutcome {
        let Some(claim) = self.seen.claim(&raw.id) else {
            return ItemOutcome::Duplicate;
        };
        counter!("ingest_fresh_total").increment(1);

        let item = self.extractor.extract(&raw, &self.name, self.kind).await;
        tracing::debug!(
            source = %self.name,
            link = %item.id,
            title = %item.title,
            published = %item.published_at,
            body_len = item.body.len(),
            "item extracted"
        );

        match self.forwarder.deliver(&item).await {
            Ok(_) => {
                counter!("ingest_delivered_total").increment(1);
                claim.mark_seen();
                ItemOutcome::Delivered
            }
            Err(e) => {
                counter!("ingest_delivery_errors_total").increment(1);
                tracing::error!(
                    source = %self.name,
                    link = %item.id,
                    endpoint = self.forwarder.endpoint(),
                    error = %e,
                    "delivery failed"
                );
                match self.policy {
                    DeliveryPolicy::AtMostOnce => claim.mark_seen(),
                    DeliveryPolicy::AtLeastOnce => claim.release(),
                }
                ItemOutcome::Failed
            }
        }
    }

    fn finish(&self, t0: std::time::Instant) {
        histogram!("ingest_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("ingest_last_cycle_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
    }
}
