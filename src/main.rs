// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use genkube::config::Config;
use genkube::kubernetes::{scheme, Client, EventHandlerFuncs, ListOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting genkube pod watcher");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, label_selector={}",
        config.namespace.as_deref().unwrap_or("<all>"),
        config.label_selector.as_deref().unwrap_or("<none>")
    );

    // Create Kubernetes client
    let client = Client::new(
        info_span!("genkube"),
        config.kube_credential_file.as_deref(),
        &[scheme::core_v1],
    )
    .await
    .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let mut opts = ListOptions::default();
    if let Some(namespace) = &config.namespace {
        opts = ListOptions::in_namespace(namespace);
    }
    if let Some(selector) = &config.label_selector {
        opts = opts.label_selector(selector);
    }

    let handler = EventHandlerFuncs::new()
        .add_func(|pod: &Pod| info!("Pod added: {}/{}", pod.namespace().unwrap_or_default(), pod.name_any()))
        .update_func(|_old: &Pod, new: &Pod| {
            let phase = new
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .unwrap_or("Unknown");
            info!(
                "Pod updated: {}/{} ({})",
                new.namespace().unwrap_or_default(),
                new.name_any(),
                phase
            );
        })
        .delete_func(|pod: &Pod| info!("Pod deleted: {}/{}", pod.namespace().unwrap_or_default(), pod.name_any()));

    let watch = client.watch_resource::<Pod, _>(handler, opts)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    client.close();
    watch.await.context("Watch task panicked")?;
    Ok(())
}
