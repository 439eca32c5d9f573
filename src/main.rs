// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lumigo_operator::config::Config;
use lumigo_operator::kubernetes::wait_for_lumigo_crd;
use lumigo_operator::reconcilers::LumigoReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Lumigo operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: operator_version={}, injector_image={}, proxy_image={}, proxy_endpoint={}",
        config.operator_version, config.injector_image, config.proxy_image, config.proxy_endpoint
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the Lumigo CRD before starting the reconciler
    info!("Waiting for Lumigo CRD to become available...");
    wait_for_lumigo_crd(&client, config.crd_wait_timeout).await?;

    info!("Starting reconciler...");
    LumigoReconciler::new(client, config).run().await?;

    // Only reached on shutdown signal
    warn!("Reconciler stopped");
    Ok(())
}
