//! Staff notifications written as a side effect of call reassignment.
//! The only mutation after creation is marking them read.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Sent to the substitute who received a redirected call.
    OfflineRedirect,
    /// Sent to the offline assignee the call was redirected away from.
    StaffOfflineRedirect,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfflineRedirect => "offline_redirect",
            Self::StaffOfflineRedirect => "staff_offline_redirect",
        }
    }
}

impl FromStr for NotificationType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline_redirect" => Ok(Self::OfflineRedirect),
            "staff_offline_redirect" => Ok(Self::StaffOfflineRedirect),
            other => Err(EngineError::validation(format!(
                "Unknown notification type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffNotification {
    pub id: String,
    pub staff_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<StaffNotification> {
    let kind: String = row.get(3)?;
    Ok(StaffNotification {
        id: row.get(0)?,
        staff_id: row.get(1)?,
        call_id: row.get(2)?,
        notification_type: kind
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn insert_notification(
    conn: &Connection,
    staff_id: &str,
    call_id: Option<&str>,
    kind: NotificationType,
    message: &str,
    at: &str,
) -> EngineResult<StaffNotification> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO staff_notifications (id, staff_id, call_id, notification_type, message,
            read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![id, staff_id, call_id, kind.as_str(), message, at],
    )?;
    Ok(StaffNotification {
        id,
        staff_id: staff_id.to_string(),
        call_id: call_id.map(String::from),
        notification_type: kind,
        message: message.to_string(),
        read: false,
        created_at: at.to_string(),
    })
}

fn query_for_staff(
    db: &DbState,
    staff_id: &str,
    unread_only: bool,
) -> EngineResult<Vec<StaffNotification>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, staff_id, call_id, notification_type, message, read, created_at
         FROM staff_notifications
         WHERE staff_id = ?1 AND (?2 = 0 OR read = 0)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![staff_id, unread_only], notification_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_unread_for_staff(db: &DbState, staff_id: &str) -> EngineResult<Vec<StaffNotification>> {
    query_for_staff(db, staff_id, true)
}

pub fn list_for_staff(db: &DbState, staff_id: &str) -> EngineResult<Vec<StaffNotification>> {
    query_for_staff(db, staff_id, false)
}

pub fn mark_read(db: &DbState, notification_id: &str) -> EngineResult<()> {
    let conn = db.lock();
    let changed = conn.execute(
        "UPDATE staff_notifications SET read = 1 WHERE id = ?1",
        params![notification_id],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("notification", notification_id));
    }
    Ok(())
}

/// Returns how many notifications were newly marked read.
pub fn mark_all_read_for_staff(db: &DbState, staff_id: &str) -> EngineResult<usize> {
    let conn = db.lock();
    let changed = conn.execute(
        "UPDATE staff_notifications SET read = 1 WHERE staff_id = ?1 AND read = 0",
        params![staff_id],
    )?;
    info!(staff_id = %staff_id, marked = changed, "Notifications marked read");
    Ok(changed)
}
