use crate::domain::receipt::ReceiptKind;
use crate::services::gateway::Metrics;
use crate::services::receipt_service::ReceiptService;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// `AckBatcher` decouples socket acknowledgments from ledger writes and coalesces many
/// `message:delivered` / `message:read` frames into a few batched inserts.
pub struct AckBatcher {
    tx: mpsc::Sender<(ReceiptKind, Uuid)>,
    handle: JoinHandle<()>,
    metrics: Metrics,
}

impl AckBatcher {
    pub fn new(
        user_id: Uuid,
        receipt_service: ReceiptService,
        metrics: Metrics,
        buffer_size: usize,
        batch_size: usize,
        flush_interval_ms: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);

        let batcher_metrics = metrics.clone();
        let handle = tokio::spawn(
            async move {
                Self::run_background(user_id, rx, receipt_service, batcher_metrics, batch_size, flush_interval_ms)
                    .await;
            }
            .instrument(tracing::info_span!("ack_batcher", "user.id" = %user_id)),
        );

        Self { tx, handle, metrics }
    }

    pub fn push(&self, kind: ReceiptKind, message_ids: Vec<Uuid>) {
        for message_id in message_ids {
            if self.tx.try_send((kind, message_id)).is_err() {
                tracing::warn!(%message_id, %kind, "Dropped ACK due to full buffer");
                self.metrics.ack_queue_dropped_total.add(1, &[]);
            }
        }
    }

    /// Stops accepting acknowledgments and lets the pending ones flush in the background.
    pub fn close(self) -> JoinHandle<()> {
        drop(self.tx);
        self.handle
    }

    async fn run_background(
        user_id: Uuid,
        mut rx: mpsc::Receiver<(ReceiptKind, Uuid)>,
        receipt_service: ReceiptService,
        metrics: Metrics,
        batch_size: usize,
        flush_interval_ms: u64,
    ) {
        loop {
            let mut batch = Vec::new();

            // Wait for the first item so idle sockets cost nothing
            match rx.recv().await {
                Some(item) => batch.push(item),
                None => return,
            }

            let timeout = tokio::time::sleep(Duration::from_millis(flush_interval_ms));
            tokio::pin!(timeout);

            loop {
                if batch.len() >= batch_size {
                    break;
                }

                tokio::select! {
                    res = rx.recv() => {
                        if let Some(item) = res {
                            batch.push(item);
                        } else {
                            Self::flush_batch(user_id, &receipt_service, &metrics, batch).await;
                            return;
                        }
                    }
                    () = &mut timeout => break,
                }
            }

            Self::flush_batch(user_id, &receipt_service, &metrics, batch).await;
        }
    }

    async fn flush_batch(
        user_id: Uuid,
        receipt_service: &ReceiptService,
        metrics: &Metrics,
        batch: Vec<(ReceiptKind, Uuid)>,
    ) {
        if batch.is_empty() {
            return;
        }

        tracing::debug!(batch_size = batch.len(), "Flushing ACK batch");
        metrics.ack_batch_size.record(batch.len() as u64, &[]);

        let (delivered, read) = split_by_kind(batch);
        for (kind, ids) in [(ReceiptKind::Delivered, delivered), (ReceiptKind::Read, read)] {
            if ids.is_empty() {
                continue;
            }
            if let Err(e) = receipt_service.acknowledge_batch(user_id, &ids, kind).await {
                tracing::error!(error = %e, %kind, "Failed to record ACK batch");
            }
        }
    }
}

/// Splits a batch into delivered and read ids, dropping duplicates and preserving order.
/// Read ids are left out of the delivered list since reading implies delivery.
fn split_by_kind(batch: Vec<(ReceiptKind, Uuid)>) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut delivered = Vec::new();
    let mut read = Vec::new();

    for (kind, id) in batch {
        let target = if kind == ReceiptKind::Read { &mut read } else { &mut delivered };
        if !target.contains(&id) {
            target.push(id);
        }
    }
    delivered.retain(|id| !read.contains(id));

    (delivered, read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dedups_and_prefers_read() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let batch = vec![
            (ReceiptKind::Delivered, a),
            (ReceiptKind::Delivered, b),
            (ReceiptKind::Delivered, a),
            (ReceiptKind::Read, b),
            (ReceiptKind::Read, c),
        ];

        let (delivered, read) = split_by_kind(batch);

        assert_eq!(delivered, vec![a]);
        assert_eq!(read, vec![b, c]);
    }
}
