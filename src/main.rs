//! execution-watch - HTTP Server Entry Point
//!
//! Starts the view server. Optional positional arguments `AGENT_ID
//! EXECUTION_ID` start watching that execution immediately.

use execution_reconciler::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "execution_reconciler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: api={} events={} stream_enabled={}",
        config.api_url, config.events_url, config.event_stream_enabled
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let initial = match args.as_slice() {
        [] => Vec::new(),
        [agent_id, execution_id] => vec![(agent_id.clone(), execution_id.clone())],
        _ => anyhow::bail!("usage: execution-watch [AGENT_ID EXECUTION_ID]"),
    };

    api::serve(config, initial).await?;

    Ok(())
}
