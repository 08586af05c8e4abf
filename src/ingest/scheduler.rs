// src/ingest/scheduler.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ingest::types::{PollSource, PushSource};
use crate::ingest::{ItemOutcome, SourcePipeline};

/// What a tick does while the previous cycle of the same source still runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start another cycle anyway; dedup claims keep them apart.
    #[default]
    Concurrent,
    /// Drop the tick.
    Skip,
}

/// Cleared on drop, so a panicking cycle does not leave the source marked busy.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run a cycle now and then every `interval` until `stop` fires.
///
/// Every cycle runs on its own task: a slow or hung cycle never delays the
/// next tick, and a panicking one is logged and forgotten.
pub fn spawn_poll_scheduler(
    pipeline: Arc<SourcePipeline>,
    source: Arc<dyn PollSource>,
    interval: Duration,
    overlap: OverlapPolicy,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let busy = Arc::new(AtomicBool::new(false));
        let mut cycles = JoinSet::new();

        tracing::info!(
            source = %pipeline.name(),
            interval_secs = interval.as_secs_f64(),
            ?overlap,
            "poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while let Some(done) = cycles.try_join_next() {
                if let Err(e) = done {
                    tracing::error!(source = %pipeline.name(), error = %e, "cycle task died");
                }
            }

            let guard = match overlap {
                OverlapPolicy::Skip if busy.swap(true, Ordering::SeqCst) => {
                    counter!("ingest_skipped_ticks_total").increment(1);
                    tracing::debug!(source = %pipeline.name(), "previous cycle still running, tick skipped");
                    continue;
                }
                OverlapPolicy::Skip => Some(BusyGuard(busy.clone())),
                OverlapPolicy::Concurrent => None,
            };

            let p = pipeline.clone();
            let s = source.clone();
            cycles.spawn(async move {
                let _guard = guard;
                p.run_cycle(s.as_ref()).await
            });
        }

        cycles.abort_all();
        while cycles.join_next().await.is_some() {}
        tracing::info!(source = %pipeline.name(), "poll scheduler stopped");
    })
}

/// Relay a push subscription through the pipeline.
///
/// The subscription enqueues raw items on a bounded queue; one consumer
/// drains it, treating every item as a single-item cycle.
pub fn spawn_push_pipeline(
    pipeline: Arc<SourcePipeline>,
    source: Arc<dyn PushSource>,
    capacity: usize,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let producer = {
        let stop = stop.clone();
        tokio::spawn(async move { source.subscribe(tx, stop).await })
    };

    tokio::spawn(async move {
        loop {
            let raw = tokio::select! {
                _ = stop.cancelled() => break,
                r = rx.recv() => match r {
                    Some(raw) => raw,
                    None => break,
                },
            };

            counter!("ingest_cycles_total").increment(1);
            counter!("ingest_fetched_total").increment(1);
            let id = raw.id.clone();
            let p = pipeline.clone();
            match tokio::spawn(async move { p.process_item(raw).await }).await {
                Ok(ItemOutcome::Duplicate) => {
                    tracing::debug!(source = %pipeline.name(), link = %id, "duplicate post ignored");
                }
                Ok(outcome) => {
                    tracing::info!(source = %pipeline.name(), link = %id, ?outcome, "post processed");
                }
                Err(e) => {
                    tracing::error!(source = %pipeline.name(), link = %id, error = %e, "post task died");
                }
            }
        }

        drop(rx);
        if let Err(e) = producer.await {
            tracing::error!(source = %pipeline.name(), error = %e, "subscription task died");
        }
        tracing::info!(source = %pipeline.name(), "push pipeline stopped");
    })
}
