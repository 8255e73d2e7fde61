/// Aquanode - multi-tenant IoT tank monitoring backend
///
/// Account and credential management, per-user device records, and a
/// message-bus-to-database telemetry bridge with a paginated query surface.

mod api;
mod auth;
mod authz;
mod config;
mod context;
mod credential;
mod db;
mod devices;
mod error;
mod external;
mod ingest;
mod jobs;
mod mailer;
mod metrics;
mod server;
mod telemetry;
mod token;

use config::ServerConfig;
use context::AppContext;
use error::AppResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aquanode=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let (ctx, channels) = AppContext::new(config).await?;

    // Start the telemetry listener on the inbound side of the bus
    let ingestor = Arc::clone(&ctx.ingestor);
    tokio::spawn(async move {
        ingestor.run(channels.inbound_rx).await;
    });

    // Drain the outbound side. A broker adapter would bridge this to the
    // real transport; without one, published messages are logged.
    let mut outbound_rx = channels.outbound_rx;
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            tracing::debug!("Outbound message on {}: {} bytes", msg.topic, msg.payload.len());
        }
    });

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::new(ctx.clone())));
    scheduler.start();

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ___                                        __
   /   | ____ ___  ______ _____  ____  ____  / /__
  / /| |/ __ `/ / / / __ `/ __ \/ __ \/ __ \/ / _ \
 / ___ / /_/ / /_/ / /_/ / / / / /_/ / /_/ / /  __/
/_/  |_\__, /\__,_/\__,_/_/ /_/\____/\__,_/_/\___/
         /_/
        IoT tank monitoring backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
