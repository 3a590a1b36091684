//! Station master binary
//!
//! Reads station messages as JSON lines on stdin, writes outbound messages
//! as JSON lines on stdout, and serves the published layout over HTTP.

use stationmesh_master::{MasterConfig, MasterNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries outbound messages, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "station_master=info,stationmesh_master=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting station master");

    let config = MasterConfig::from_env()?;
    MasterNode::new(config).run().await?;

    Ok(())
}
