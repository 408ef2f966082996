//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了 serve 命令：启动HTTP服务。

use super::ServeArgs;
use crate::config::Config;
use crate::coordinator::{CoordinatorOptions, FreshnessCoordinator};
use crate::http::{router, AppState};
use crate::source::build_source;
use crate::store::build_store;
use crate::telemetry::init_tracing;
use crate::utils::redaction::redact_url;
use anyhow::{Context, Result};
use tracing::info;

pub async fn execute(args: &ServeArgs) -> Result<()> {
    let mut config = Config::from_file(&args.config)?;
    if let Some(bind) = &args.bind {
        config.server.bind_addr = bind.clone();
        config.validate().map_err(anyhow::Error::msg)?;
    }

    init_tracing(&config.server.service_name, &config.logging);

    let store = build_store(&config.store)?;
    let source = build_source(&config.source)?;
    info!(
        "Upstream source {} with {:?} store (derive={:?})",
        redact_url(&config.source.url),
        config.store.backend,
        config.source.derive.as_ref().map(|d| d.field.as_str())
    );

    let coordinator = FreshnessCoordinator::new(store, source, CoordinatorOptions::from(&config));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!("Listening on {}", config.server.bind_addr);

    axum::serve(listener, router(AppState::new(coordinator.clone())))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    coordinator.shutdown().await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
