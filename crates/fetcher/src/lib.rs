pub mod artifact;
pub mod chrome;
pub mod identity;
pub mod orchestrator;
pub mod session;

pub use chrome::ChromeEngine;
pub use identity::{IdentityControl, TorController};
pub use orchestrator::{Attempt, AttemptOutcome, CapturedResult, FetchOrchestrator, RunOutcome};
pub use session::SessionManager;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use torfetch_common::{FetchConfig, FingerprintPool};
use tracing::{info, warn};

/// Run one fetch to completion: wire up the Chrome engine and the Tor
/// control adapter, drive the orchestrator, and persist the artifact on
/// success.
///
/// A persistence failure after a successful fetch is returned as an error -
/// the document was fetched but not delivered.
pub async fn run_fetch(config: FetchConfig) -> Result<RunOutcome> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let fingerprints = if config.fingerprints.is_empty() {
        FingerprintPool::builtin()
    } else {
        FingerprintPool::new(config.fingerprints.clone())?
    };
    let engine = Arc::new(ChromeEngine::new(
        config.headless,
        config.browser_path.clone(),
    ));
    let identity = Box::new(TorController::new(
        config.control_addr.clone(),
        config.control_password.clone(),
        config.proxy.clone(),
        config.check_url.clone(),
    ));

    let orchestrator =
        FetchOrchestrator::new(config.clone(), fingerprints, engine, identity, cancel.clone());
    let outcome = orchestrator.run().await;

    if let RunOutcome::Success { result, .. } = &outcome {
        match serde_json::to_string_pretty(&result.headers) {
            Ok(json) => info!("--- Captured Headers ---\n{}", json),
            Err(e) => warn!("Could not render captured headers: {}", e),
        }
        let path = artifact::artifact_path(&config.output_dir, &config.target_url, chrono::Local::now());
        artifact::write_artifact(&path, &result.content)
            .context("fetched document could not be delivered")?;
        info!(
            "Page content saved to {} ({} bytes, sha256 {})",
            path.display(),
            result.content.len(),
            content_hash(&result.content)
        );
    }

    Ok(outcome)
}

/// SHA256 of content for compact logging.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Operator interrupt: Ctrl+C or SIGTERM cancels the run at the next
/// suspension point; the orchestrator still runs its mandatory cleanup.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C signal");
        },
        _ = terminate => {
            warn!("Received SIGTERM signal");
        },
    }

    warn!("Cancelling the fetch run - cleanup happens at the next suspension point");
    cancel.cancel();
}
