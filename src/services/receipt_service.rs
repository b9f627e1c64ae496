use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::receipt_repo::ReceiptRepository;
use crate::adapters::database::records::NewReceiptRecord;
use crate::adapters::database::room_repo::RoomRepository;
use crate::domain::message::{MessageType, MessageView};
use crate::domain::notification::{EventTarget, ServerEvent};
use crate::domain::receipt::{ReceiptBatch, ReceiptKind};
use crate::error::{AppError, Result};
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::room_service::require_membership;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    recorded_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            recorded_total: meter
                .u64_counter("ephemera_receipts_recorded_total")
                .with_description("Total receipt rows newly written to the ledger")
                .build(),
        }
    }
}

/// Groups newly written ledger rows into one notification per sender, room and kind.
/// Implied kinds come back as their own batches so senders see every state change.
pub(crate) fn group_batches(actor_id: Uuid, records: Vec<NewReceiptRecord>) -> Vec<(Uuid, ReceiptBatch)> {
    let mut grouped: BTreeMap<(Uuid, Uuid, ReceiptKind), ReceiptBatch> = BTreeMap::new();

    for record in records {
        let Ok(kind) = record.kind.parse::<ReceiptKind>() else {
            tracing::error!(kind = %record.kind, "Ledger returned unknown receipt kind");
            continue;
        };

        grouped
            .entry((record.sender_id, record.room_id, kind))
            .and_modify(|batch| {
                batch.message_ids.push(record.message_id);
                batch.recorded_at = batch.recorded_at.max(record.recorded_at);
            })
            .or_insert_with(|| ReceiptBatch {
                room_id: record.room_id,
                message_ids: vec![record.message_id],
                user_id: actor_id,
                kind,
                recorded_at: record.recorded_at,
            });
    }

    grouped.into_iter().map(|((sender_id, _, _), batch)| (sender_id, batch)).collect()
}

/// Records delivery, read, view-once and playback acknowledgments in the receipt ledger
/// and tells each sender about the receipts that are new.
#[derive(Clone, Debug)]
pub struct ReceiptService {
    pool: DbPool,
    repo: ReceiptRepository,
    messages: MessageRepository,
    rooms: RoomRepository,
    message_service: MessageService,
    notifier: NotificationService,
    metrics: Metrics,
}

impl ReceiptService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        repo: ReceiptRepository,
        messages: MessageRepository,
        rooms: RoomRepository,
        message_service: MessageService,
        notifier: NotificationService,
    ) -> Self {
        Self { pool, repo, messages, rooms, message_service, notifier, metrics: Metrics::new() }
    }

    /// Acknowledges a single message and returns it as the actor now sees it.
    /// Acknowledging one's own message changes nothing.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message is missing, deleted for everyone or hidden
    /// from the actor by a delete-for-me or a room clear.
    /// Returns `AppError::Forbidden` if the actor is not a member of the room.
    /// Returns `AppError::BadRequest` for `viewed` on an ordinary message or `heard` on a non-audio one.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(recorded = tracing::field::Empty))]
    pub async fn acknowledge(&self, actor_id: Uuid, message_id: Uuid, kind: ReceiptKind) -> Result<MessageView> {
        let mut conn = self.pool.acquire().await?;
        let message = self.messages.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;

        if message.is_deleted_for_everyone {
            return Err(AppError::NotFound);
        }
        let membership = require_membership(&self.rooms, &mut conn, message.room_id, actor_id).await?;
        if !message.is_visible_to(actor_id, membership.cleared_at) {
            return Err(AppError::NotFound);
        }

        match kind {
            ReceiptKind::Viewed if !message.is_view_once => {
                return Err(AppError::BadRequest("Only view-once messages can be marked viewed".into()));
            }
            ReceiptKind::Heard if message.message_type != MessageType::Audio => {
                return Err(AppError::BadRequest("Only audio messages can be marked heard".into()));
            }
            _ => {}
        }

        if message.sender_id != actor_id {
            let records = self.repo.record(&mut conn, actor_id, &[message_id], kind).await?;
            tracing::Span::current().record("recorded", records.len());
            drop(conn);
            self.announce(actor_id, records).await;
        } else {
            drop(conn);
        }

        self.message_service.view_for(actor_id, message_id).await
    }

    /// Acknowledges many messages at once. Messages the actor cannot acknowledge are skipped.
    /// Returns how many ledger rows were added.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for kinds that need per-message checks.
    #[tracing::instrument(err(level = "warn"), skip(self, message_ids), fields(count = message_ids.len()))]
    pub async fn acknowledge_batch(&self, actor_id: Uuid, message_ids: &[Uuid], kind: ReceiptKind) -> Result<usize> {
        if !matches!(kind, ReceiptKind::Delivered | ReceiptKind::Read) {
            return Err(AppError::BadRequest("Only delivered and read can be batched".into()));
        }

        let mut conn = self.pool.acquire().await?;
        let records = self.repo.record(&mut conn, actor_id, message_ids, kind).await?;
        drop(conn);

        let recorded = records.len();
        self.announce(actor_id, records).await;
        Ok(recorded)
    }

    /// Marks everything the actor can see in a room as read.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the actor is not a member of the room.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_room_read(&self, actor_id: Uuid, room_id: Uuid) -> Result<usize> {
        let mut conn = self.pool.acquire().await?;
        require_membership(&self.rooms, &mut conn, room_id, actor_id).await?;
        let records = self.repo.record_room_read(&mut conn, actor_id, room_id).await?;
        drop(conn);

        let recorded = records.len();
        self.announce(actor_id, records).await;
        Ok(recorded)
    }

    async fn announce(&self, actor_id: Uuid, records: Vec<NewReceiptRecord>) {
        if records.is_empty() {
            return;
        }

        for (sender_id, batch) in group_batches(actor_id, records) {
            self.metrics
                .recorded_total
                .add(batch.message_ids.len() as u64, &[KeyValue::new("kind", batch.kind.as_str())]);
            self.notifier.notify(EventTarget::User(sender_id), ServerEvent::Receipt(batch)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn record(message_id: Uuid, room_id: Uuid, sender_id: Uuid, kind: &str, secs: i64) -> NewReceiptRecord {
        NewReceiptRecord {
            message_id,
            room_id,
            sender_id,
            kind: kind.to_string(),
            recorded_at: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(secs),
        }
    }

    #[test]
    fn test_batches_grouped_by_sender_and_kind() {
        let actor = Uuid::new_v4();
        let room = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (m1, m2, m3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let batches = group_batches(
            actor,
            vec![
                record(m1, room, alice, "delivered", 1),
                record(m1, room, alice, "read", 1),
                record(m2, room, alice, "read", 2),
                record(m3, room, bob, "read", 3),
            ],
        );

        assert_eq!(batches.len(), 3);
        let alice_read = batches
            .iter()
            .find(|(sender, batch)| *sender == alice && batch.kind == ReceiptKind::Read)
            .map(|(_, batch)| batch)
            .unwrap();
        assert_eq!(alice_read.message_ids, vec![m1, m2]);
        assert_eq!(alice_read.user_id, actor);
        assert_eq!(alice_read.recorded_at, OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(2));
        assert!(batches.iter().any(|(sender, batch)| *sender == bob && batch.message_ids == vec![m3]));
    }

    #[test]
    fn test_no_records_no_batches() {
        assert!(group_batches(Uuid::new_v4(), Vec::new()).is_empty());
    }
}
