use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc, watch};

mod indicator_logic;
use indicator_logic::{config, logger};

use lib_indicator::engine::{Projection, SyncCoordinator};
use lib_indicator::ingestors::{FrontStreamSession, SessionState};
use lib_indicator::retrieve::PluralApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    let settings = config::load_config()?;
    let _log_guard = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    tracing::info!(field = %settings.field_name, "Starting server_indicator.");

    let (shutdown_tx, _) = broadcast::channel(1);
    let (front_tx, front_rx) = mpsc::unbounded_channel();
    let (projection_tx, projection_rx) = mpsc::unbounded_channel();

    // The socket opens before bootstrap; changes it delivers meanwhile are queued by the coordinator.
    let session = Arc::new(FrontStreamSession::new(settings.stream.clone(), front_tx));
    let mut stream_handle = tokio::spawn({
        let session = session.clone();
        let mut shutdown = shutdown_tx.subscribe();
        async move { session.run(&mut shutdown).await }
    });
    let monitor_handle = tokio::spawn(watch_session(session.subscribe_state(), shutdown_tx.subscribe()));
    let consumer_handle = tokio::spawn(print_projections(projection_rx));

    let api = PluralApi::new(&settings.api_url, &settings.token)?;
    let coordinator = SyncCoordinator::new(api, settings.field_name.clone(), projection_tx);

    let mut stream_result = None;
    let outcome = tokio::select! {
        res = coordinator.run(front_rx) => res.map_err(anyhow::Error::from),
        res = &mut stream_handle => {
            // The socket gave up; nothing more can arrive.
            stream_result = Some(res?);
            Ok(())
        }
        _ = shutdown_signal() => Ok(()),
    };
    if let Err(e) = &outcome {
        tracing::error!("{:#}", e);
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    let stream_result = match stream_result {
        Some(res) => res,
        None => stream_handle.await?,
    };
    if let Err(e) = &stream_result {
        tracing::error!("Front stream stopped: {}", e);
    }
    let _ = monitor_handle.await;
    let _ = consumer_handle.await;

    tracing::info!("Shutdown complete.");
    outcome?;
    stream_result?;
    Ok(())
}

/// The projection consumer: one JSON array per change on stdout.
async fn print_projections(mut projections: mpsc::UnboundedReceiver<Projection>) {
    while let Some(projection) = projections.recv().await {
        match serde_json::to_string(&projection) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to encode projection: {}", e),
        }
    }
}

async fn watch_session(mut state_rx: watch::Receiver<SessionState>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                tracing::info!(?state, "Front session state changed.");
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating shutdown."),
    }
}
