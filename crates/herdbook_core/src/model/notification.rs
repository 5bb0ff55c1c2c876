//! Notification model.
//!
//! Notifications are derived artifacts: the reconciler computes them from
//! breeding and calving history, and storage keeps them as an audit trail.
//!
//! # Invariants
//! - `dedup_key` = `(kind, source breeding id, scheduled_for)` and is unique
//!   in storage; repeated reconciliation never creates a second row for it.
//! - Read notifications are never rewritten.

use super::animal::AnimalId;
use super::breeding::BreedingId;
use super::UserId;
use crate::calendar::{format_date, parse_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PdCheck,
    ExpectedCalving,
    ReopenBreeding,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PdCheck => "pd_check",
            Self::ExpectedCalving => "expected_calving",
            Self::ReopenBreeding => "reopen_breeding",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pd_check" => Some(Self::PdCheck),
            "expected_calving" => Some(Self::ExpectedCalving),
            "reopen_breeding" => Some(Self::ReopenBreeding),
            _ => None,
        }
    }
}

/// Delivery channel. Only in-app delivery exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    InApp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InApp => "in_app",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_app" => Some(Self::InApp),
            _ => None,
        }
    }
}

/// Deterministic identity of one reminder occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub kind: NotificationKind,
    pub source_id: BreedingId,
    pub scheduled_for: NaiveDate,
}

impl DedupKey {
    pub fn new(kind: NotificationKind, source_id: BreedingId, scheduled_for: NaiveDate) -> Self {
        Self {
            kind,
            source_id,
            scheduled_for,
        }
    }

    /// Storage form: `kind:source_id:YYYY-MM-DD`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            self.source_id,
            format_date(self.scheduled_for)
        )
    }

    pub fn decode(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let kind = NotificationKind::parse(parts.next()?)?;
        let source_id = parts.next()?.parse::<BreedingId>().ok()?;
        let scheduled_for = parse_date(parts.next()?).ok()?;
        Some(Self::new(kind, source_id, scheduled_for))
    }

    /// Reminder slot this key occupies, independent of its date.
    pub fn slot(&self) -> (NotificationKind, BreedingId) {
        (self.kind, self.source_id)
    }
}

impl Display for DedupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Persisted notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub animal_id: Option<AnimalId>,
    pub channel: Channel,
    pub dedup_key: DedupKey,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        self.dedup_key.kind
    }

    pub fn scheduled_for(&self) -> NaiveDate {
        self.dedup_key.scheduled_for
    }
}

/// One create-or-update instruction produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationUpsert {
    pub dedup_key: DedupKey,
    pub user_id: UserId,
    pub animal_id: Option<AnimalId>,
    pub channel: Channel,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    /// Unread row for the same slot whose due date shifted; storage rewrites
    /// it in place instead of inserting a second reminder.
    pub supersedes: Option<DedupKey>,
}

impl NotificationUpsert {
    pub fn kind(&self) -> NotificationKind {
        self.dedup_key.kind
    }

    pub fn scheduled_for(&self) -> NaiveDate {
        self.dedup_key.scheduled_for
    }

    pub fn source_id(&self) -> BreedingId {
        self.dedup_key.source_id
    }
}
