//! Notification repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist reconciled reminders idempotently, keyed by `dedup_key`.
//! - Serve the paged in-app notification feed and read-state updates.
//!
//! # Invariants
//! - `apply_upsert` runs in one `BEGIN IMMEDIATE` transaction; concurrent
//!   reconcilers for the same user serialize on it and cannot double-insert.
//! - Read rows are never rewritten or superseded.
//! - Feed order is `scheduled_for DESC, id ASC`.

use super::{ensure_connection_ready, int_to_bool, RepoError, RepoResult};
use crate::calendar::format_date;
use crate::model::notification::{
    Channel, DedupKey, Notification, NotificationId, NotificationUpsert,
};
use crate::model::UserId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const NOTIFICATIONS_DEFAULT_LIMIT: u32 = 20;
const NOTIFICATIONS_LIMIT_MAX: u32 = 100;

const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id, user_id, animal_id, channel, dedup_key, title, body, metadata, is_read, created_at
FROM notifications";

/// What `apply_upsert` did with one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Unread row rewritten, either in place or by superseding a stale slot.
    Updated,
    Unchanged,
}

/// Query options for the notification feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationPageQuery {
    pub user_id: UserId,
    pub unread_only: bool,
    /// Maximum rows to return. Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

pub trait NotificationStore {
    /// Every notification of one user, read or unread, in feed order.
    fn list_notifications(&self, user_id: UserId) -> RepoResult<Vec<Notification>>;
    /// Applies one reconciliation instruction atomically.
    fn apply_upsert(&self, upsert: &NotificationUpsert) -> RepoResult<UpsertOutcome>;
    fn list_page(&self, query: &NotificationPageQuery) -> RepoResult<Vec<Notification>>;
    /// Returns `false` when the notification was already read.
    fn mark_read(&self, user_id: UserId, id: NotificationId) -> RepoResult<bool>;
    fn mark_all_read(&self, user_id: UserId) -> RepoResult<usize>;
    fn unread_count(&self, user_id: UserId) -> RepoResult<u32>;
}

pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NotificationStore for SqliteNotificationRepository<'_> {
    fn list_notifications(&self, user_id: UserId) -> RepoResult<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTIFICATION_SELECT_SQL} WHERE user_id = ?1 ORDER BY scheduled_for DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([user_id])?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn apply_upsert(&self, upsert: &NotificationUpsert) -> RepoResult<UpsertOutcome> {
        let key = upsert.dedup_key.encode();
        let scheduled_for = format_date(upsert.scheduled_for());
        let metadata = upsert.metadata.to_string();
        let now = now_epoch_ms();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if let Some(stale) = &upsert.supersedes {
            let moved = tx.execute(
                "UPDATE notifications
                 SET dedup_key = ?3,
                     scheduled_for = ?4,
                     animal_id = ?5,
                     title = ?6,
                     body = ?7,
                     metadata = ?8,
                     updated_at = ?9
                 WHERE user_id = ?1
                   AND dedup_key = ?2
                   AND is_read = 0
                   AND NOT EXISTS (SELECT 1 FROM notifications WHERE dedup_key = ?3);",
                params![
                    upsert.user_id,
                    stale.encode(),
                    key,
                    scheduled_for,
                    upsert.animal_id,
                    upsert.title,
                    upsert.body,
                    metadata,
                    now,
                ],
            )?;
            if moved == 1 {
                tx.commit()?;
                return Ok(UpsertOutcome::Updated);
            }
        }

        let inserted = tx.execute(
            "INSERT INTO notifications (
                id, user_id, animal_id, channel, type, source_id, scheduled_for,
                dedup_key, title, body, metadata, is_read, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)
            ON CONFLICT (dedup_key) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                upsert.user_id,
                upsert.animal_id,
                upsert.channel.as_str(),
                upsert.kind().as_str(),
                upsert.source_id(),
                scheduled_for,
                key,
                upsert.title,
                upsert.body,
                metadata,
                now,
            ],
        )?;
        if inserted == 1 {
            tx.commit()?;
            return Ok(UpsertOutcome::Inserted);
        }

        let refreshed = tx.execute(
            "UPDATE notifications
             SET title = ?3, body = ?4, metadata = ?5, animal_id = ?6, updated_at = ?7
             WHERE user_id = ?1
               AND dedup_key = ?2
               AND is_read = 0
               AND (title <> ?3 OR body <> ?4 OR metadata <> ?5
                    OR animal_id IS NOT ?6);",
            params![
                upsert.user_id,
                key,
                upsert.title,
                upsert.body,
                metadata,
                upsert.animal_id,
                now,
            ],
        )?;
        tx.commit()?;

        if refreshed == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    fn list_page(&self, query: &NotificationPageQuery) -> RepoResult<Vec<Notification>> {
        let mut sql = format!("{NOTIFICATION_SELECT_SQL} WHERE user_id = ?");
        let mut bind_values = vec![Value::Integer(query.user_id)];
        if query.unread_only {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY scheduled_for DESC, id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(normalize_page_limit(query.limit))));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }
        sql.push(';');

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn mark_read(&self, user_id: UserId, id: NotificationId) -> RepoResult<bool> {
        let id_text = id.to_string();
        let is_read: Option<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT is_read FROM notifications WHERE user_id = ?1 AND id = ?2;")?;
            let mut rows = stmt.query(params![user_id, id_text])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        match is_read {
            None => Err(RepoError::not_found("notification", id)),
            Some(1) => Ok(false),
            Some(_) => {
                self.conn.execute(
                    "UPDATE notifications SET is_read = 1, updated_at = ?3
                     WHERE user_id = ?1 AND id = ?2;",
                    params![user_id, id_text, now_epoch_ms()],
                )?;
                Ok(true)
            }
        }
    }

    fn mark_all_read(&self, user_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE notifications SET is_read = 1, updated_at = ?2
             WHERE user_id = ?1 AND is_read = 0;",
            params![user_id, now_epoch_ms()],
        )?;
        Ok(changed)
    }

    fn unread_count(&self, user_id: UserId) -> RepoResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0;",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Normalizes the feed page size.
pub fn normalize_page_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => NOTIFICATIONS_DEFAULT_LIMIT,
        Some(value) if value > NOTIFICATIONS_LIMIT_MAX => NOTIFICATIONS_LIMIT_MAX,
        Some(value) => value,
    }
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let channel_text: String = row.get("channel")?;
    let key_text: String = row.get("dedup_key")?;
    let metadata_text: String = row.get("metadata")?;

    Ok(Notification {
        id: Uuid::parse_str(&id_text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid `{id_text}` in notifications.id"))
        })?,
        user_id: row.get("user_id")?,
        animal_id: row.get("animal_id")?,
        channel: Channel::parse(&channel_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid channel `{channel_text}` in notifications.channel"
            ))
        })?,
        dedup_key: DedupKey::decode(&key_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid dedup key `{key_text}` in notifications.dedup_key"
            ))
        })?,
        title: row.get("title")?,
        body: row.get("body")?,
        metadata: serde_json::from_str(&metadata_text).map_err(|err| {
            RepoError::InvalidData(format!("invalid json in notifications.metadata: {err}"))
        })?,
        is_read: int_to_bool(row.get("is_read")?, "notifications.is_read")?,
        created_at: row.get("created_at")?,
    })
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
