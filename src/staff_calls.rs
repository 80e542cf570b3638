//! Staff-call dispatcher.
//!
//! A customer "call staff" request is routed to the staff member assigned to
//! the table. If that member is offline and another active member is online,
//! the call is redirected to the online member with the fewest tables and
//! both sides get a notification.
//!
//! **Rules:**
//! - Status: pending -> acknowledged -> resolved, or pending -> resolved
//! - `resolved` is terminal
//! - Water requests always carry `acknowledgedAt` once acknowledged or resolved
//! - Presence is read once at creation; it is not a lock

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{now_ts, ts, with_transaction, DbState};
use crate::error::{or_not_found, EngineError, EngineResult};
use crate::notifications::{insert_notification, NotificationType, StaffNotification};
use crate::orders::count_pending_orders;
use crate::staff::{find_responsible_staff, list_staff_conn, Staff};

/// Reason text the customer menu sends for the "water" quick action.
pub const WATER_REASON: &str = "Asking for water";

/// Exact match on the quick-action text. Free-typed variants are ordinary calls.
pub fn is_water_request(reason: Option<&str>) -> bool {
    reason == Some(WATER_REASON)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Acknowledged,
    Resolved,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Acknowledged)
                | (Self::Pending, Self::Resolved)
                | (Self::Acknowledged, Self::Resolved)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            other => Err(EngineError::validation(format!("Unknown call status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffCall {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    pub table_id: String,
    pub table_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_staff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassign_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewStaffCall {
    pub restaurant_id: Option<String>,
    pub table_id: String,
    pub table_number: i64,
    pub zone_name: Option<String>,
    pub reason: Option<String>,
}

/// A created call plus the notifications its dispatch produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchedCall {
    pub call: StaffCall,
    pub notifications: Vec<StaffNotification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCounts {
    pub pending_calls: i64,
    pub pending_orders: i64,
}

const CALL_COLUMNS: &str = "id, restaurant_id, table_id, table_number, zone_name, reason, status,
    original_staff_id, reassigned_to, reassign_reason, acknowledged_at, resolved_at,
    created_at, updated_at";

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<StaffCall> {
    let status: String = row.get(6)?;
    Ok(StaffCall {
        id: row.get(0)?,
        restaurant_id: row.get(1)?,
        table_id: row.get(2)?,
        table_number: row.get(3)?,
        zone_name: row.get(4)?,
        reason: row.get(5)?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        original_staff_id: row.get(7)?,
        reassigned_to: row.get(8)?,
        reassign_reason: row.get(9)?,
        acknowledged_at: row.get(10)?,
        resolved_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn load_call(conn: &Connection, call_id: &str) -> EngineResult<StaffCall> {
    or_not_found(
        conn.query_row(
            &format!("SELECT {CALL_COLUMNS} FROM staff_calls WHERE id = ?1"),
            params![call_id],
            call_from_row,
        ),
        "staff call",
        call_id,
    )
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Online, active stand-in for an offline assignee: fewest assigned tables,
/// earliest-created on ties.
fn pick_substitute(candidates: Vec<Staff>, offline: &Staff) -> Option<Staff> {
    candidates
        .into_iter()
        .filter(|s| s.id != offline.id && s.active && s.is_online)
        .min_by_key(|s| s.assigned_tables.len())
}

/// Create a call for a table, redirecting it when the assignee is offline.
pub fn create_staff_call(db: &DbState, new: NewStaffCall) -> EngineResult<DispatchedCall> {
    let table_id = new.table_id.trim().to_string();
    if table_id.is_empty() {
        return Err(EngineError::validation("Missing tableId"));
    }
    if new.table_number <= 0 {
        return Err(EngineError::validation("tableNumber must be positive"));
    }
    let zone_name = trimmed(new.zone_name);
    let reason = trimmed(new.reason);
    let restaurant_id = new.restaurant_id;

    let conn = db.lock();
    let dispatched = with_transaction(&conn, |tx| {
        let scope = restaurant_id.as_deref();
        let assigned = find_responsible_staff(tx, scope, new.table_number)?;

        let substitute = match &assigned {
            Some(staff) if !staff.is_online => {
                pick_substitute(list_staff_conn(tx, scope, true)?, staff)
            }
            _ => None,
        };

        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        let reassign_reason = match (&assigned, &substitute) {
            (Some(original), Some(sub)) => Some(format!(
                "{} is offline; redirected to {}",
                original.name, sub.name
            )),
            _ => None,
        };

        let call = StaffCall {
            id: id.clone(),
            restaurant_id: restaurant_id.clone(),
            table_id: table_id.clone(),
            table_number: new.table_number,
            zone_name: zone_name.clone(),
            reason: reason.clone(),
            status: CallStatus::Pending,
            original_staff_id: assigned.as_ref().map(|s| s.id.clone()),
            reassigned_to: substitute.as_ref().map(|s| s.id.clone()),
            reassign_reason,
            acknowledged_at: None,
            resolved_at: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        tx.execute(
            "INSERT INTO staff_calls (id, restaurant_id, table_id, table_number, zone_name, reason,
                status, original_staff_id, reassigned_to, reassign_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10, ?10)",
            params![
                call.id,
                call.restaurant_id,
                call.table_id,
                call.table_number,
                call.zone_name,
                call.reason,
                call.original_staff_id,
                call.reassigned_to,
                call.reassign_reason,
                now,
            ],
        )?;

        let mut notifications = Vec::new();
        if let (Some(original), Some(sub)) = (&assigned, &substitute) {
            let what = call.reason.as_deref().unwrap_or("Assistance requested");
            let where_ = match call.zone_name.as_deref() {
                Some(zone) => format!("Table {} ({zone})", call.table_number),
                None => format!("Table {}", call.table_number),
            };
            notifications.push(insert_notification(
                tx,
                &sub.id,
                Some(&id),
                NotificationType::OfflineRedirect,
                &format!("{where_}: {what}. Redirected to you because {} is offline.", original.name),
                &now,
            )?);
            notifications.push(insert_notification(
                tx,
                &original.id,
                Some(&id),
                NotificationType::StaffOfflineRedirect,
                &format!("{where_} called while you were offline. {} is handling it.", sub.name),
                &now,
            )?);
        }

        Ok(DispatchedCall {
            call,
            notifications,
        })
    })?;

    let call = &dispatched.call;
    if let (Some(original), Some(sub)) = (&call.original_staff_id, &call.reassigned_to) {
        info!(
            call_id = %call.id,
            table_number = call.table_number,
            original_staff_id = %original,
            reassigned_to = %sub,
            "Staff call redirected from offline assignee"
        );
    } else {
        info!(
            call_id = %call.id,
            table_number = call.table_number,
            original_staff_id = ?call.original_staff_id,
            "Staff call created"
        );
    }

    Ok(dispatched)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

pub fn update_staff_call_status(
    db: &DbState,
    call_id: &str,
    target: CallStatus,
) -> EngineResult<StaffCall> {
    let conn = db.lock();
    with_transaction(&conn, |tx| {
        let mut call = load_call(tx, call_id)?;
        if call.status == CallStatus::Resolved {
            return Err(EngineError::illegal_transition("staff call", call.status, target));
        }
        if call.status == target {
            debug!(call_id = %call_id, status = %target, "Call status unchanged");
            return Ok(call);
        }
        if !call.status.can_transition_to(target) {
            return Err(EngineError::illegal_transition("staff call", call.status, target));
        }

        let now = now_ts();
        let water = is_water_request(call.reason.as_deref());
        match target {
            CallStatus::Acknowledged if water => {
                call.acknowledged_at = Some(now.clone());
            }
            CallStatus::Resolved => {
                call.resolved_at = Some(now.clone());
                if water && call.acknowledged_at.is_none() {
                    call.acknowledged_at = Some(now.clone());
                }
            }
            _ => {}
        }

        tx.execute(
            "UPDATE staff_calls SET status = ?1, acknowledged_at = ?2, resolved_at = ?3,
                updated_at = ?4
             WHERE id = ?5",
            params![
                target.as_str(),
                call.acknowledged_at,
                call.resolved_at,
                now,
                call_id
            ],
        )?;

        info!(call_id = %call_id, from = %call.status, to = %target, "Staff call status updated");
        call.status = target;
        call.updated_at = now;
        Ok(call)
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn get_staff_call(db: &DbState, call_id: &str) -> EngineResult<StaffCall> {
    let conn = db.lock();
    load_call(&conn, call_id)
}

/// Pending calls, oldest first.
pub fn list_pending_staff_calls(
    db: &DbState,
    restaurant_id: Option<&str>,
) -> EngineResult<Vec<StaffCall>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_COLUMNS} FROM staff_calls
         WHERE status = 'pending' AND (?1 IS NULL OR restaurant_id = ?1)
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt
        .query_map(params![restaurant_id], call_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most recent acknowledged or resolved water call for a table whose
/// acknowledgment falls within the last `window_secs`.
pub fn get_water_acknowledged(
    db: &DbState,
    restaurant_id: Option<&str>,
    table_number: i64,
    window_secs: i64,
    now: DateTime<Utc>,
) -> EngineResult<Option<StaffCall>> {
    let since = ts(now - Duration::seconds(window_secs));
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {CALL_COLUMNS} FROM staff_calls
         WHERE table_number = ?1
           AND status IN ('acknowledged', 'resolved')
           AND acknowledged_at IS NOT NULL AND acknowledged_at >= ?2
           AND (?3 IS NULL OR restaurant_id = ?3)
         ORDER BY acknowledged_at DESC, rowid DESC"
    ))?;
    let calls = stmt
        .query_map(params![table_number, since, restaurant_id], call_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(calls
        .into_iter()
        .find(|c| is_water_request(c.reason.as_deref())))
}

/// Counts feeding the dashboard's sound/push alert.
pub fn alert_counts(db: &DbState, restaurant_id: Option<&str>) -> EngineResult<AlertCounts> {
    let conn = db.lock();
    let pending_calls = conn.query_row(
        "SELECT COUNT(*) FROM staff_calls
         WHERE status = 'pending' AND (?1 IS NULL OR restaurant_id = ?1)",
        params![restaurant_id],
        |row| row.get(0),
    )?;
    Ok(AlertCounts {
        pending_calls,
        pending_orders: count_pending_orders(&conn, restaurant_id)?,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::notifications::list_unread_for_staff;
    use crate::orders::place_order;
    use crate::orders::tests::new_order;
    use crate::staff::tests::waiter;
    use crate::staff::{create_staff, toggle_staff_active, update_staff_last_seen};

    fn call(table_number: i64, reason: Option<&str>) -> NewStaffCall {
        NewStaffCall {
            restaurant_id: None,
            table_id: format!("table-{table_number}"),
            table_number,
            zone_name: Some("Terrace".into()),
            reason: reason.map(String::from),
        }
    }

    #[test]
    fn test_offline_assignee_redirected_to_least_loaded() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[7])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[1, 2])).unwrap();
        let c = create_staff(&db, waiter("Cy", &[3, 4, 5, 6, 8])).unwrap();
        update_staff_last_seen(&db, &b.id).unwrap();
        update_staff_last_seen(&db, &c.id).unwrap();

        let dispatched = create_staff_call(&db, call(7, None)).unwrap();
        let created = &dispatched.call;
        assert_eq!(created.status, CallStatus::Pending);
        assert_eq!(created.original_staff_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(created.reassigned_to.as_deref(), Some(b.id.as_str()));
        assert!(created.reassign_reason.is_some());

        assert_eq!(dispatched.notifications.len(), 2);
        let to_b = list_unread_for_staff(&db, &b.id).unwrap();
        let to_a = list_unread_for_staff(&db, &a.id).unwrap();
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].notification_type, NotificationType::OfflineRedirect);
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0].notification_type, NotificationType::StaffOfflineRedirect);
        assert!(list_unread_for_staff(&db, &c.id).unwrap().is_empty());
    }

    #[test]
    fn test_tie_goes_to_earliest_created() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[7])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[1])).unwrap();
        let c = create_staff(&db, waiter("Cy", &[2])).unwrap();
        update_staff_last_seen(&db, &c.id).unwrap();
        update_staff_last_seen(&db, &b.id).unwrap();

        let dispatched = create_staff_call(&db, call(7, None)).unwrap();
        assert_eq!(dispatched.call.reassigned_to.as_deref(), Some(b.id.as_str()));
    }

    #[test]
    fn test_no_online_substitute() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[7])).unwrap();
        create_staff(&db, waiter("Ben", &[1])).unwrap();

        let dispatched = create_staff_call(&db, call(7, Some("Bill please"))).unwrap();
        assert_eq!(dispatched.call.original_staff_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(dispatched.call.reassigned_to, None);
        assert!(dispatched.notifications.is_empty());

        let conn = db.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM staff_notifications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_inactive_staff_never_substitutes() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[7])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[1])).unwrap();
        update_staff_last_seen(&db, &b.id).unwrap();
        toggle_staff_active(&db, &b.id).unwrap();

        let dispatched = create_staff_call(&db, call(7, None)).unwrap();
        assert_eq!(dispatched.call.reassigned_to, None);
    }

    #[test]
    fn test_online_assignee_keeps_call() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[7])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[1])).unwrap();
        update_staff_last_seen(&db, &a.id).unwrap();
        update_staff_last_seen(&db, &b.id).unwrap();

        let dispatched = create_staff_call(&db, call(7, None)).unwrap();
        assert_eq!(dispatched.call.original_staff_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(dispatched.call.reassigned_to, None);
        assert!(dispatched.notifications.is_empty());
    }

    #[test]
    fn test_unassigned_table_has_no_original() {
        let db = test_db();
        let dispatched = create_staff_call(&db, call(42, None)).unwrap();
        assert_eq!(dispatched.call.original_staff_id, None);
        assert_eq!(dispatched.call.reassigned_to, None);
        assert_eq!(list_pending_staff_calls(&db, None).unwrap().len(), 1);
    }

    #[test]
    fn test_water_resolved_directly_stamps_acknowledged() {
        let db = test_db();
        let created = create_staff_call(&db, call(3, Some(WATER_REASON))).unwrap().call;
        assert!(created.acknowledged_at.is_none());

        let resolved = update_staff_call_status(&db, &created.id, CallStatus::Resolved).unwrap();
        assert_eq!(resolved.status, CallStatus::Resolved);
        assert!(resolved.acknowledged_at.is_some());
        assert_eq!(resolved.acknowledged_at, resolved.resolved_at);
        assert_eq!(get_staff_call(&db, &created.id).unwrap(), resolved);
    }

    #[test]
    fn test_water_acknowledge_then_resolve_keeps_first_stamp() {
        let db = test_db();
        let created = create_staff_call(&db, call(3, Some(WATER_REASON))).unwrap().call;
        let acked = update_staff_call_status(&db, &created.id, CallStatus::Acknowledged).unwrap();
        let stamp = acked.acknowledged_at.clone();
        assert!(stamp.is_some());

        let resolved = update_staff_call_status(&db, &created.id, CallStatus::Resolved).unwrap();
        assert_eq!(resolved.acknowledged_at, stamp);
    }

    #[test]
    fn test_non_water_call_has_no_ack_stamp() {
        let db = test_db();
        let created = create_staff_call(&db, call(3, Some("Bill please"))).unwrap().call;
        let acked = update_staff_call_status(&db, &created.id, CallStatus::Acknowledged).unwrap();
        assert!(acked.acknowledged_at.is_none());
    }

    #[test]
    fn test_water_match_is_exact() {
        assert!(is_water_request(Some(WATER_REASON)));
        assert!(!is_water_request(Some("asking for water")));
        assert!(!is_water_request(Some("Asking for water please")));
        assert!(!is_water_request(None));

        let db = test_db();
        let created = create_staff_call(&db, call(5, Some("asking for water"))).unwrap().call;
        let resolved = update_staff_call_status(&db, &created.id, CallStatus::Resolved).unwrap();
        assert!(resolved.acknowledged_at.is_none());
        assert!(get_water_acknowledged(&db, None, 5, 300, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resolved_is_terminal() {
        let db = test_db();
        let created = create_staff_call(&db, call(3, None)).unwrap().call;
        update_staff_call_status(&db, &created.id, CallStatus::Resolved).unwrap();

        for target in [
            CallStatus::Pending,
            CallStatus::Acknowledged,
            CallStatus::Resolved,
        ] {
            let err = update_staff_call_status(&db, &created.id, target).unwrap_err();
            assert!(matches!(err, EngineError::IllegalTransition { .. }));
        }
        assert!(list_pending_staff_calls(&db, None).unwrap().is_empty());
    }

    #[test]
    fn test_water_acknowledged_window() {
        let db = test_db();
        let created = create_staff_call(&db, call(5, Some(WATER_REASON))).unwrap().call;
        assert!(get_water_acknowledged(&db, None, 5, 300, Utc::now())
            .unwrap()
            .is_none());

        update_staff_call_status(&db, &created.id, CallStatus::Acknowledged).unwrap();
        let found = get_water_acknowledged(&db, None, 5, 300, Utc::now()).unwrap();
        assert_eq!(found.map(|c| c.id), Some(created.id.clone()));

        let later = Utc::now() + Duration::seconds(301);
        assert!(get_water_acknowledged(&db, None, 5, 300, later)
            .unwrap()
            .is_none());
        assert!(get_water_acknowledged(&db, None, 6, 300, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_alert_counts() {
        let db = test_db();
        create_staff_call(&db, call(1, None)).unwrap();
        let second = create_staff_call(&db, call(2, None)).unwrap().call;
        update_staff_call_status(&db, &second.id, CallStatus::Acknowledged).unwrap();
        place_order(&db, new_order("1", "sess")).unwrap();

        let counts = alert_counts(&db, None).unwrap();
        assert_eq!(
            counts,
            AlertCounts {
                pending_calls: 1,
                pending_orders: 1
            }
        );
    }

    #[test]
    fn test_invalid_call_rejected() {
        let db = test_db();
        let mut bad = call(0, None);
        assert!(matches!(
            create_staff_call(&db, bad.clone()),
            Err(EngineError::Validation(_))
        ));
        bad.table_number = 1;
        bad.table_id = " ".into();
        assert!(matches!(
            create_staff_call(&db, bad),
            Err(EngineError::Validation(_))
        ));
    }
}
