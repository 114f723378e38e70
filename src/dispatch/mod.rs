//! Dispatch pipeline — queue, worker loop, status reporting.
//!
//! Architecture: channel-based. Producers enqueue into the unbounded
//! [`queue::DispatchQueue`]; a single [`worker::run_worker`] task
//! drains it and drives the transport; status transitions flow out on
//! a dedicated channel for the UI layer to read (a logging task stands
//! in for the tray icon in `run` mode).

pub mod queue;
pub mod worker;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::identity::Identity;
use crate::payload::Payload;
use crate::settings::RelaySettings;
use crate::transport::{Endpoints, FirebaseTransport};

pub use queue::DispatchQueue;
pub use worker::{SENT_COOLDOWN, StatusUpdate, WorkerState, run_worker};

/// Startup/runtime errors for the relay loop.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the relay until SIGTERM, SIGINT, or stdin EOF.
///
/// Each stdin line becomes a Text payload, standing in for the UI/tray
/// producers. On EOF the queue is closed and the worker drains what
/// remains; on a signal the worker is cancelled without finishing
/// in-flight work.
pub async fn run() -> Result<(), RunError> {
    let settings = RelaySettings::load().await;
    let identity = Identity::from_env(&settings);
    let device_id = identity.device_id.clone();

    let http = reqwest::Client::builder().build()?;
    let transport = FirebaseTransport::new(http, settings, identity, Endpoints::default());

    let (queue, payload_rx) = DispatchQueue::new();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StatusUpdate>();
    let cancel = CancellationToken::new();

    // Status sink: the desktop build hands these to the tray icon.
    tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            match &update.hint {
                Some(hint) => tracing::info!(state = ?update.state, %hint, "status"),
                None => tracing::info!(state = ?update.state, "status"),
            }
        }
    });

    let worker = tokio::spawn(run_worker(
        payload_rx,
        transport,
        status_tx,
        cancel.clone(),
        SENT_COOLDOWN,
    ));

    tracing::info!("relay started, reading payloads from stdin");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    queue.enqueue(Payload::text(line, Some(device_id.clone())));
                }
                Ok(None) => {
                    tracing::info!("stdin closed, draining queue");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            },
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                cancel.cancel();
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                cancel.cancel();
                break;
            }
        }
    }

    // Closing the queue lets the worker finish; when cancelled it
    // stops without draining.
    drop(queue);
    let _ = worker.await;

    tracing::info!("relay stopped");
    Ok(())
}
