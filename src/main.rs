//! News ingester binary.
//! Loads config, starts one pipeline per source and runs until Ctrl-C.

use anyhow::Result;
use news_ingester::{app, load_config_default, metrics::Metrics};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_ingester=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()?;
    let stop = CancellationToken::new();

    let metrics_task = match cfg.metrics_addr.clone() {
        Some(addr) => {
            let m = Metrics::init()?;
            let stop = stop.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = m.serve(&addr, stop).await {
                    tracing::error!(error = ?e, "metrics endpoint failed");
                }
            }))
        }
        None => None,
    };

    let handles = app::spawn_all(&cfg, &stop)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    stop.cancel();

    for h in handles {
        if let Err(e) = h.await {
            tracing::error!(error = %e, "pipeline task died");
        }
    }
    if let Some(t) = metrics_task {
        let _ = t.await;
    }
    tracing::info!("bye");
    Ok(())
}
