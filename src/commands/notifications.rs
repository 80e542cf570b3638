use serde::Deserialize;
use serde_json::Value;

use super::{parse_payload, required, to_json};
use crate::db::DbState;
use crate::error::EngineResult;
use crate::notifications;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaffIdPayload {
    #[serde(alias = "staff_id")]
    staff_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationIdPayload {
    #[serde(alias = "notification_id", alias = "id")]
    notification_id: String,
}

fn parse_staff_id(arg: Value) -> EngineResult<String> {
    let parsed: StaffIdPayload = parse_payload(arg, "staffId", "staff id")?;
    required(&parsed.staff_id, "staffId")
}

pub(super) fn notification_list_unread(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    to_json(&notifications::list_unread_for_staff(db, &staff_id)?)
}

pub(super) fn notification_list(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    to_json(&notifications::list_for_staff(db, &staff_id)?)
}

pub(super) fn notification_mark_read(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: NotificationIdPayload = parse_payload(arg, "notificationId", "notification id")?;
    let id = required(&parsed.notification_id, "notificationId")?;
    notifications::mark_read(db, &id)?;
    Ok(serde_json::json!({ "success": true }))
}

pub(super) fn notification_mark_all_read(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    let marked = notifications::mark_all_read_for_staff(db, &staff_id)?;
    Ok(serde_json::json!({ "success": true, "marked": marked }))
}
