use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, parse_payload, parse_scope, required, to_json};
use crate::db::DbState;
use crate::error::{EngineError, EngineResult};
use crate::staff::{self, NewStaff, StaffRole, StaffUpdate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStaffPayload {
    #[serde(default, alias = "restaurant_id")]
    restaurant_id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, alias = "assigned_tables", alias = "tables")]
    assigned_tables: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStaffPayload {
    #[serde(alias = "staff_id", alias = "id")]
    staff_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, alias = "assigned_tables", alias = "tables")]
    assigned_tables: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaffIdPayload {
    #[serde(alias = "staff_id", alias = "id")]
    staff_id: String,
}

fn parse_role(role: Option<String>) -> EngineResult<Option<StaffRole>> {
    non_empty(role).map(|r| r.parse()).transpose()
}

fn parse_create_payload(arg: Value) -> EngineResult<NewStaff> {
    let parsed: CreateStaffPayload = parse_payload(arg, "name", "staff")?;
    let role = parse_role(parsed.role)?
        .ok_or_else(|| EngineError::validation("Staff role is required"))?;
    Ok(NewStaff {
        restaurant_id: non_empty(parsed.restaurant_id),
        name: parsed.name,
        role,
        phone: parsed.phone,
        assigned_tables: parsed.assigned_tables,
    })
}

fn parse_update_payload(arg: Value) -> EngineResult<(String, StaffUpdate)> {
    let parsed: UpdateStaffPayload = parse_payload(arg, "staffId", "staff update")?;
    let staff_id = required(&parsed.staff_id, "staffId")?;
    Ok((
        staff_id,
        StaffUpdate {
            name: parsed.name,
            role: parse_role(parsed.role)?,
            phone: parsed.phone,
            assigned_tables: parsed.assigned_tables,
        },
    ))
}

fn parse_staff_id(arg: Value) -> EngineResult<String> {
    let parsed: StaffIdPayload = parse_payload(arg, "staffId", "staff id")?;
    required(&parsed.staff_id, "staffId")
}

pub(super) fn staff_create(db: &DbState, arg: Value) -> EngineResult<Value> {
    let new = parse_create_payload(arg)?;
    to_json(&staff::create_staff(db, new)?)
}

pub(super) fn staff_update(db: &DbState, arg: Value) -> EngineResult<Value> {
    let (staff_id, update) = parse_update_payload(arg)?;
    to_json(&staff::update_staff(db, &staff_id, update)?)
}

pub(super) fn staff_toggle_active(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    to_json(&staff::toggle_staff_active(db, &staff_id)?)
}

pub(super) fn staff_remove(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    staff::remove_staff(db, &staff_id)?;
    Ok(serde_json::json!({ "success": true }))
}

pub(super) fn staff_set_offline(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    staff::set_staff_offline(db, &staff_id)?;
    Ok(serde_json::json!({ "success": true }))
}

pub(super) fn staff_heartbeat(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    staff::update_staff_last_seen(db, &staff_id)?;
    Ok(serde_json::json!({ "success": true }))
}

pub(super) fn staff_list(db: &DbState, arg: Value) -> EngineResult<Value> {
    let scope = parse_scope(arg)?;
    to_json(&staff::list_staff(db, scope.as_deref())?)
}

pub(super) fn staff_get(db: &DbState, arg: Value) -> EngineResult<Value> {
    let staff_id = parse_staff_id(arg)?;
    to_json(&staff::get_staff(db, &staff_id)?)
}
