//! Runs one background-replacement batch from a JSON manifest.
//!
//! ```text
//! showroom-worker manifest.json
//! ```
//!
//! The manifest names the prompt and images, and optionally a listing:
//! `{"listingId": "l-1", "prompt": "sunset beach", "images": [{"publicId": "...", "url": "..."}]}`.
//! With a listing id and a configured listing backend, the first preview
//! of every image is saved back to the listing once all jobs finish.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use showroom_core::image::Image;
use showroom_pipeline::{BatchCoordinator, BatchEvent, PipelineConfig};
use showroom_remote::api::MediaApi;
use showroom_remote::config::RemoteConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    listing_id: Option<String>,
    prompt: String,
    images: Vec<Image>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "showroom_worker=info,showroom_pipeline=info,showroom_remote=info".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Manifest ---
    let path = std::env::args()
        .nth(1)
        .context("usage: showroom-worker <manifest.json>")?;
    let manifest = read_manifest(Path::new(&path))?;

    // --- Configuration ---
    let remote = RemoteConfig::from_env()?;
    let pipeline = PipelineConfig::from_env()?;
    tracing::info!(
        media_api_url = %remote.media_api_url,
        fallback = ?remote.fallback,
        max_polls = pipeline.poll.max_polls,
        "Loaded worker configuration",
    );

    // --- Coordinator ---
    let api = Arc::new(MediaApi::new(&remote.media_api_url));
    let mut coordinator = BatchCoordinator::new(
        remote.submitter(&api, pipeline.submit_timeout),
        Arc::new(remote.status_source(&api)),
        &pipeline,
    );
    if let Some(store) = remote.listing_store()? {
        coordinator = coordinator.with_listing_store(store);
    }
    let logger = tokio::spawn(log_events(coordinator.subscribe()));

    // --- Run ---
    let outcome = tokio::select! {
        result = run(&coordinator, &manifest) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping batch");
            Ok(())
        }
    };

    coordinator.shutdown().await;
    drop(coordinator);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger).await;
    match &outcome {
        Ok(()) => tracing::info!("Worker finished"),
        Err(e) => tracing::error!(error = %e, "Batch run failed"),
    }
    outcome
}

fn read_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_manifest(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
}

fn parse_manifest(raw: &str) -> anyhow::Result<Manifest> {
    Ok(serde_json::from_str(raw)?)
}

async fn run(coordinator: &BatchCoordinator, manifest: &Manifest) -> anyhow::Result<()> {
    let report = coordinator
        .process_batch_background(&manifest.images, &manifest.prompt)
        .await?;
    tracing::info!(batch_id = %report.batch_id, "All images submitted");

    let summary = coordinator.wait_for_jobs().await;
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        "All jobs finished",
    );

    let Some(listing_id) = &manifest.listing_id else {
        let state = coordinator.state().await;
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    };

    let saved = coordinator
        .save_current_selection(listing_id, &manifest.images)
        .await?;
    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}

/// Log every batch event until the coordinator is dropped.
async fn log_events(mut rx: broadcast::Receiver<BatchEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "Batch event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize batch event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
