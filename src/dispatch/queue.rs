//! Dispatch queue — unbounded MPSC buffer between capture and delivery.
//!
//! Producers (UI, tray, stdin in `run` mode) enqueue without ever
//! blocking on the consumer; the single worker owns the receiver and
//! drains in FIFO order. A watch channel carries a running enqueue
//! count so observers can track queue growth without consuming.

use tokio::sync::{mpsc, watch};

use crate::payload::Payload;

/// Cloneable producer handle. The matching receiver is handed to the
/// dispatch worker at startup; single-consumer discipline is by
/// convention, not enforced here.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Payload>,
    enqueued: watch::Sender<u64>,
}

impl DispatchQueue {
    /// Create the queue, returning the producer handle and the
    /// consumer's receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (enqueued, _) = watch::channel(0);
        (Self { tx, enqueued }, rx)
    }

    /// Enqueue a payload. Never blocks; acceptance is guaranteed once
    /// this returns. A send can only fail after the worker's receiver
    /// is gone, which happens during shutdown.
    pub fn enqueue(&self, payload: Payload) {
        let payload_id = payload.id.clone();
        if self.tx.send(payload).is_err() {
            tracing::warn!(%payload_id, "dispatch queue closed, payload discarded");
            return;
        }
        self.enqueued.send_modify(|count| *count += 1);
        tracing::debug!(%payload_id, "payload enqueued");
    }

    /// Subscribe to the running count of enqueued payloads.
    pub fn watch_enqueued(&self) -> watch::Receiver<u64> {
        self.enqueued.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_for_single_producer() {
        let (queue, mut rx) = DispatchQueue::new();
        for i in 0..10 {
            queue.enqueue(Payload::text(format!("item-{i}"), None));
        }
        drop(queue);

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p.text_content.unwrap());
        }
        let expected: Vec<String> = (0..10).map(|i| format!("item-{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn per_producer_order_holds_under_concurrency() {
        let (queue, mut rx) = DispatchQueue::new();

        let producers: Vec<_> = (0..8)
            .map(|producer| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for seq in 0..50 {
                        queue.enqueue(Payload::text(format!("{producer}:{seq}"), None));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        futures::future::join_all(producers).await;
        drop(queue);

        let mut last_seq = [0i64; 8];
        last_seq.fill(-1);
        let mut total = 0;
        while let Some(p) = rx.recv().await {
            let text = p.text_content.unwrap();
            let (producer, seq) = text.split_once(':').unwrap();
            let producer: usize = producer.parse().unwrap();
            let seq: i64 = seq.parse().unwrap();
            assert!(
                seq > last_seq[producer],
                "producer {producer} out of order: {seq} after {}",
                last_seq[producer]
            );
            last_seq[producer] = seq;
            total += 1;
        }
        assert_eq!(total, 8 * 50);
    }

    #[tokio::test]
    async fn enqueue_never_blocks_without_consumer() {
        let (queue, mut rx) = DispatchQueue::new();
        // No consumer draining yet; depth grows unbounded.
        for i in 0..10_000 {
            queue.enqueue(Payload::text(i.to_string(), None));
        }
        drop(queue);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 10_000);
    }

    #[tokio::test]
    async fn watch_counter_tracks_enqueues() {
        let (queue, _rx) = DispatchQueue::new();
        let watcher = queue.watch_enqueued();
        assert_eq!(*watcher.borrow(), 0);

        queue.enqueue(Payload::text("a", None));
        queue.enqueue(Payload::text("b", None));
        assert_eq!(*watcher.borrow(), 2);
    }

    #[tokio::test]
    async fn enqueue_after_receiver_dropped_does_not_panic() {
        let (queue, rx) = DispatchQueue::new();
        drop(rx);
        queue.enqueue(Payload::text("late", None));
    }
}
