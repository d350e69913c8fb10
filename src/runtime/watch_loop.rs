//! # Watch Loop
//!
//! Controller watch loop that monitors PostgresBackup resources and triggers
//! reconciliation when changes are detected.

use crate::config::SharedControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::PostgresBackup;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run the controller watch loop
///
/// Sets up the Kubernetes controller to watch PostgresBackup resources and
/// trigger reconciliation on changes. On SIGINT/SIGTERM the readiness probe
/// starts failing, in-flight workload waits are cancelled, and the loop exits
/// once the controller stream drains. The stream is restarted after errors.
///
/// # Errors
/// Currently infallible; the signature leaves room for startup failures
pub async fn run_watch_loop(
    backups: Api<PostgresBackup>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(controller_config.backoff_start_ms));

    // Set up shutdown signal handler - mark server as not ready when SIGTERM/SIGINT received
    let shutdown_server_state = Arc::clone(&server_state);
    let shutdown_token = reconciler.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");

        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        shutdown_token.cancel();
        info!("Marked server as not ready, cancelling in-flight backup waits...");
    });

    loop {
        if reconciler.shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff_clone = Arc::clone(&backoff_duration_ms);
        let config_for_filter = Arc::clone(&controller_config);
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!(parent: &watch_span, "Starting controller watch loop...");
        Controller::new(backups.clone(), watcher::Config::default().any_semantic())
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff_clone);
                let config = Arc::clone(&config_for_filter);
                async move {
                    match &x {
                        Ok((object, _action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!(resource.name = object.name.as_str(), "watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if reconciler.shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay_secs = controller_config.watch_restart_delay_after_end_secs;
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay_secs
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
