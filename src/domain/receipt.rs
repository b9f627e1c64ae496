use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Acknowledgment states a recipient can record against a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Delivered,
    Read,
    Viewed,
    Heard,
}

impl ReceiptKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Viewed => "viewed",
            Self::Heard => "heard",
        }
    }

    /// The kinds written when this kind is recorded. Reading implies delivery, and
    /// opening view-once media or playing a voice note implies reading.
    #[must_use]
    pub const fn implied(self) -> &'static [Self] {
        match self {
            Self::Delivered => &[Self::Delivered],
            Self::Read => &[Self::Delivered, Self::Read],
            Self::Viewed => &[Self::Delivered, Self::Read, Self::Viewed],
            Self::Heard => &[Self::Delivered, Self::Read, Self::Heard],
        }
    }
}

impl fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "viewed" => Ok(Self::Viewed),
            "heard" => Ok(Self::Heard),
            other => Err(AppError::BadRequest(format!("Unknown receipt kind: {other}"))),
        }
    }
}

/// One row of the receipt ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub kind: ReceiptKind,
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

/// Per-message acknowledgment sets, derived from the ledger on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgments {
    pub delivered_to: Vec<Uuid>,
    pub read_by: Vec<Uuid>,
    pub viewed_by: Vec<Uuid>,
    pub heard_by: Vec<Uuid>,
    pub delivered_at: BTreeMap<Uuid, Stamp>,
    pub read_at: BTreeMap<Uuid, Stamp>,
    pub viewed_at: BTreeMap<Uuid, Stamp>,
}

impl Acknowledgments {
    /// Builds the sets for one message. The sender is never part of them, and every user
    /// appears at most once per kind, ordered by when they acknowledged.
    #[must_use]
    pub fn from_receipts<'a>(sender_id: Uuid, receipts: impl IntoIterator<Item = &'a Receipt>) -> Self {
        let mut by_kind: BTreeMap<ReceiptKind, BTreeMap<Uuid, OffsetDateTime>> = BTreeMap::new();

        for receipt in receipts.into_iter().filter(|r| r.user_id != sender_id) {
            by_kind
                .entry(receipt.kind)
                .or_default()
                .entry(receipt.user_id)
                .and_modify(|at| *at = (*at).min(receipt.recorded_at))
                .or_insert(receipt.recorded_at);
        }

        let ordered = |kind: ReceiptKind| -> Vec<Uuid> {
            let mut entries: Vec<(OffsetDateTime, Uuid)> = by_kind
                .get(&kind)
                .map(|users| users.iter().map(|(user, at)| (*at, *user)).collect())
                .unwrap_or_default();
            entries.sort();
            entries.into_iter().map(|(_, user)| user).collect()
        };

        let stamps = |kind: ReceiptKind| -> BTreeMap<Uuid, Stamp> {
            by_kind
                .get(&kind)
                .map(|users| users.iter().map(|(user, at)| (*user, Stamp(*at))).collect())
                .unwrap_or_default()
        };

        Self {
            delivered_to: ordered(ReceiptKind::Delivered),
            read_by: ordered(ReceiptKind::Read),
            viewed_by: ordered(ReceiptKind::Viewed),
            heard_by: ordered(ReceiptKind::Heard),
            delivered_at: stamps(ReceiptKind::Delivered),
            read_at: stamps(ReceiptKind::Read),
            viewed_at: stamps(ReceiptKind::Viewed),
        }
    }
}

/// Newly recorded receipts of one kind by one user, grouped per sender for notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptBatch {
    pub room_id: Uuid,
    pub message_ids: Vec<Uuid>,
    pub user_id: Uuid,
    pub kind: ReceiptKind,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}
