// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// escbridge: local print bridge for web point-of-sale pages.
//
// Entry point. Initialises logging and configuration, wires the platform
// spooler, drivers, catalog and registry together, and serves HTTP until
// Ctrl-C.

use std::sync::Arc;

use escbridge_bridge::{PlatformBridge, platform_bridge};
use escbridge_core::BridgeConfig;
use escbridge_escpos::Encoder;
use escbridge_print::{ConnectionRegistry, PrintBridge, PrinterCatalog, SystemDrivers};
use escbridge_server::HttpServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "escbridge failed");
        std::process::exit(1);
    }
}

async fn run() -> escbridge_core::error::Result<()> {
    let config = BridgeConfig::from_env()?;
    let platform: Arc<dyn PlatformBridge> = Arc::from(platform_bridge(&config));
    tracing::info!(platform = platform.platform_name(), "escbridge starting");

    let drivers = Arc::new(SystemDrivers::new(&config, Arc::clone(&platform)));
    let catalog = PrinterCatalog::system(platform);
    let registry = Arc::new(ConnectionRegistry::new(drivers, catalog));
    let bridge = PrintBridge::new(registry).with_encoder(Encoder::new(config.code_page));

    let mut server =
        HttpServer::start(&config.listen_address(), bridge.clone(), config.max_request_bytes)
            .await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; shutting down");
    }
    tracing::info!("shutting down");

    server.stop().await?;
    bridge.shutdown().await;
    Ok(())
}
