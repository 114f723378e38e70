//! Dispatch worker — the single consumer loop draining the queue.
//!
//! Per payload: `Sending` → transport call → `Sent`, then `Idle` after
//! a short cooldown so observers see the success state briefly. A
//! transport error (only the outbox write can fail) surfaces as an
//! `Error` status and the loop continues — durability is the
//! transport's job, the worker never retries. Payloads are delivered
//! strictly one at a time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::payload::Payload;
use crate::transport::{PayloadTransport, SendOutcome};

/// Coarse status surfaced to the UI (tray icon).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Sending,
    Sent,
    Error,
}

/// One status transition plus an optional human-readable tooltip.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub state: WorkerState,
    pub hint: Option<String>,
}

/// How long the `Sent` state stays visible before resetting to `Idle`.
pub const SENT_COOLDOWN: Duration = Duration::from_secs(2);

/// Run the worker loop until the queue closes or `cancel` fires.
///
/// Status transitions go to `status_tx`; a dropped receiver is
/// tolerated (the UI is an external collaborator and may be gone
/// during shutdown).
pub async fn run_worker<T: PayloadTransport>(
    mut rx: mpsc::UnboundedReceiver<Payload>,
    transport: T,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
    cancel: CancellationToken,
    sent_cooldown: Duration,
) {
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        emit(
            &status_tx,
            WorkerState::Sending,
            Some("Uploading clipboard to Biome…"),
        );
        tracing::info!(payload_id = %payload.id, kind = ?payload.kind, "dispatching payload");

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.send(&payload) => result,
        };

        match result {
            Ok(outcome) => {
                match &outcome {
                    SendOutcome::Delivered { storage_path } => {
                        tracing::info!(payload_id = %payload.id, %storage_path, "payload sent");
                    }
                    SendOutcome::Outboxed { reason, .. } => {
                        tracing::info!(payload_id = %payload.id, %reason, "payload archived to outbox");
                    }
                }
                emit(
                    &status_tx,
                    WorkerState::Sent,
                    Some("Clipboard delivered to Biome."),
                );

                // Brief success state, then reset.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(sent_cooldown) => {}
                }
                emit(&status_tx, WorkerState::Idle, None);
            }
            Err(e) => {
                tracing::error!(payload_id = %payload.id, error = %e, "dispatch failed");
                emit(
                    &status_tx,
                    WorkerState::Error,
                    Some("Failed to upload clipboard. Check logs."),
                );
            }
        }
    }

    emit(
        &status_tx,
        WorkerState::Idle,
        Some("Clipboard relay stopped."),
    );
}

fn emit(status_tx: &mpsc::UnboundedSender<StatusUpdate>, state: WorkerState, hint: Option<&str>) {
    let _ = status_tx.send(StatusUpdate {
        state,
        hint: hint.map(String::from),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use crate::dispatch::queue::DispatchQueue;
    use crate::transport::OutboxError;

    /// Transport double: records the payload ids it saw, fails the
    /// ones listed in `fail_ids` with an outbox-write error.
    #[derive(Clone, Default)]
    struct FakeTransport {
        calls: Arc<Mutex<Vec<String>>>,
        fail_ids: Arc<HashSet<String>>,
    }

    impl PayloadTransport for FakeTransport {
        async fn send(&self, payload: &Payload) -> Result<SendOutcome, OutboxError> {
            self.calls.lock().unwrap().push(payload.id.clone());
            if self.fail_ids.contains(&payload.id) {
                return Err(OutboxError::Write {
                    path: PathBuf::from("/outbox/x.json"),
                    source: std::io::Error::other("disk full"),
                });
            }
            Ok(SendOutcome::Delivered {
                storage_path: format!("clips/acct/{}.json", payload.id),
            })
        }
    }

    fn spawn_worker(
        transport: FakeTransport,
    ) -> (
        DispatchQueue,
        mpsc::UnboundedReceiver<StatusUpdate>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (queue, rx) = DispatchQueue::new();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            rx,
            transport,
            status_tx,
            cancel.clone(),
            Duration::from_millis(10),
        ));
        (queue, status_rx, cancel, handle)
    }

    async fn collect_states(
        status_rx: &mut mpsc::UnboundedReceiver<StatusUpdate>,
    ) -> Vec<WorkerState> {
        let mut states = Vec::new();
        while let Some(update) = status_rx.recv().await {
            states.push(update.state);
        }
        states
    }

    #[tokio::test]
    async fn success_emits_sending_sent_idle() {
        let transport = FakeTransport::default();
        let (queue, mut status_rx, _cancel, handle) = spawn_worker(transport.clone());

        queue.enqueue(Payload::text("hello", None));
        drop(queue);
        handle.await.unwrap();

        let states = collect_states(&mut status_rx).await;
        assert_eq!(
            states,
            vec![
                WorkerState::Sending,
                WorkerState::Sent,
                WorkerState::Idle,
                WorkerState::Idle, // final transition on loop exit
            ]
        );
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payloads_are_delivered_in_order_one_at_a_time() {
        let transport = FakeTransport::default();
        let (queue, _status_rx, _cancel, handle) = spawn_worker(transport.clone());

        let ids: Vec<String> = (0..5)
            .map(|i| {
                let p = Payload::text(format!("item-{i}"), None);
                let id = p.id.clone();
                queue.enqueue(p);
                id
            })
            .collect();
        drop(queue);
        handle.await.unwrap();

        assert_eq!(*transport.calls.lock().unwrap(), ids);
    }

    #[tokio::test]
    async fn transport_error_emits_error_and_loop_continues() {
        let failing = Payload::text("bad", None);
        let ok = Payload::text("good", None);
        let transport = FakeTransport {
            calls: Arc::default(),
            fail_ids: Arc::new(HashSet::from([failing.id.clone()])),
        };
        let (queue, mut status_rx, _cancel, handle) = spawn_worker(transport.clone());

        queue.enqueue(failing);
        queue.enqueue(ok.clone());
        drop(queue);
        handle.await.unwrap();

        // Both payloads were attempted despite the first failing.
        assert_eq!(transport.calls.lock().unwrap().len(), 2);

        let states = collect_states(&mut status_rx).await;
        assert_eq!(
            states,
            vec![
                WorkerState::Sending,
                WorkerState::Error,
                WorkerState::Sending,
                WorkerState::Sent,
                WorkerState::Idle,
                WorkerState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn error_status_carries_a_hint() {
        let failing = Payload::text("bad", None);
        let transport = FakeTransport {
            calls: Arc::default(),
            fail_ids: Arc::new(HashSet::from([failing.id.clone()])),
        };
        let (queue, mut status_rx, _cancel, handle) = spawn_worker(transport);

        queue.enqueue(failing);
        drop(queue);
        handle.await.unwrap();

        let mut saw_error_hint = false;
        while let Some(update) = status_rx.recv().await {
            if update.state == WorkerState::Error {
                assert!(update.hint.is_some());
                saw_error_hint = true;
            }
        }
        assert!(saw_error_hint);
    }

    #[tokio::test]
    async fn cancellation_stops_promptly_with_final_idle() {
        let transport = FakeTransport::default();
        let (queue, mut status_rx, cancel, handle) = spawn_worker(transport);

        // Cancel while the worker is idle waiting for payloads.
        cancel.cancel();
        handle.await.unwrap();
        drop(queue);

        let states = collect_states(&mut status_rx).await;
        assert_eq!(states, vec![WorkerState::Idle]);
    }

    #[tokio::test]
    async fn dropped_status_receiver_does_not_stop_the_worker() {
        let transport = FakeTransport::default();
        let (queue, status_rx, _cancel, handle) = spawn_worker(transport.clone());
        drop(status_rx);

        queue.enqueue(Payload::text("hello", None));
        drop(queue);
        handle.await.unwrap();

        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }
}
