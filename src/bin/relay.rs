//! Relay server
//!
//! Forwards frames between connected intercom clients.
//!
//! Usage: `relay [bind_addr]`

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_intercom::network::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:6000".to_string());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Cannot bind {}", bind_addr))?;

    Relay::new()
        .run_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Relay stopped");
    Ok(())
}
