use anyhow::{Context, Result};
use mirror_backup::mirror::MirrorEngine;
use mirror_backup::utils;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = utils::config::load_config()?;

    // Initialize tracing with minimal overhead
    utils::logging::init_tracing(config.log_format);

    let mirror_config = config
        .mirror_config()
        .context("configuration error")?;

    info!("Starting Mirror Backup v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Mirroring {} -> {}",
        mirror_config.source_root.display(),
        mirror_config.backup_root.display()
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let engine = MirrorEngine::new(Arc::new(mirror_config));
    let totals = engine
        .run(cancel)
        .await
        .context("mirror engine stopped with an error")?;

    info!(
        "Mirror stopped gracefully ({} copied, {} skipped, {} failed)",
        totals.copied, totals.skipped, totals.failed
    );
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
