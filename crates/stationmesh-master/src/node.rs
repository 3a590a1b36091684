//! Master Node - wires the coordinator to its surroundings.
//!
//! Architecture:
//! - Coordinator cycle in a background task
//! - Inbound JSON lines from stdin, outbound JSON lines to stdout
//! - HTTP query API on the configured address

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api;
use crate::bridge::{drain_outbound, pump_inbound};
use crate::config::MasterConfig;
use crate::coordinator::MasterCoordinator;
use crate::error::Result;
use crate::publish::{ChannelPublisher, SystemClock};

/// A running station master.
pub struct MasterNode {
    config: MasterConfig,
}

impl MasterNode {
    pub fn new(config: MasterConfig) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Station master starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Cycle: {:?}", self.config.cycle.period);

        let (publisher, outbound) = ChannelPublisher::new();
        let coordinator = Arc::new(MasterCoordinator::new(
            self.config.cycle.clone(),
            Arc::new(publisher),
            Arc::new(SystemClock),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            if let Err(e) = drain_outbound(outbound, tokio::io::stdout()).await {
                tracing::error!("Outbound bridge error: {}", e);
            }
        });

        let inbound_coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = pump_inbound(stdin, inbound_coordinator).await {
                tracing::error!("Inbound bridge error: {}", e);
            }
        });

        let cycle = tokio::spawn(Arc::clone(&coordinator).run(shutdown_rx));

        let app = api::build_router(coordinator.store());
        let listener = TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Cannot listen for shutdown signal: {}", e);
                }
            })
            .await?;

        tracing::info!("Shutting down");
        // Receiver may already be gone if the cycle task ended.
        let _ = shutdown_tx.send(true);
        if let Err(e) = cycle.await {
            tracing::error!("Cycle task ended abnormally: {}", e);
        }
        Ok(())
    }
}
