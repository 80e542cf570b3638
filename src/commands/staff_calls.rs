use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, parse_payload, parse_scope, required, string_or_number, to_json};
use crate::config::AppConfig;
use crate::db::DbState;
use crate::error::EngineResult;
use crate::staff_calls::{self, CallStatus, NewStaffCall};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallPayload {
    #[serde(default, alias = "restaurant_id")]
    restaurant_id: Option<String>,
    #[serde(alias = "table_id", deserialize_with = "string_or_number")]
    table_id: String,
    #[serde(alias = "table_number")]
    table_number: i64,
    #[serde(default, alias = "zone_name", alias = "zone")]
    zone_name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallIdPayload {
    #[serde(alias = "call_id", alias = "id")]
    call_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallStatusPayload {
    #[serde(alias = "call_id", alias = "id")]
    call_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaterAckPayload {
    #[serde(default, alias = "restaurant_id")]
    restaurant_id: Option<String>,
    #[serde(alias = "table_number")]
    table_number: i64,
}

fn parse_create_payload(arg: Value) -> EngineResult<NewStaffCall> {
    let parsed: CreateCallPayload = parse_payload(arg, "tableId", "staff call")?;
    Ok(NewStaffCall {
        restaurant_id: non_empty(parsed.restaurant_id),
        table_id: parsed.table_id,
        table_number: parsed.table_number,
        zone_name: parsed.zone_name,
        reason: parsed.reason,
    })
}

pub(super) fn staff_call_create(db: &DbState, arg: Value) -> EngineResult<Value> {
    let new = parse_create_payload(arg)?;
    to_json(&staff_calls::create_staff_call(db, new)?)
}

pub(super) fn staff_call_update_status(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: CallStatusPayload = parse_payload(arg, "callId", "call status")?;
    let call_id = required(&parsed.call_id, "callId")?;
    let status: CallStatus = parsed.status.parse()?;
    to_json(&staff_calls::update_staff_call_status(db, &call_id, status)?)
}

pub(super) fn staff_call_get(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: CallIdPayload = parse_payload(arg, "callId", "call id")?;
    let call_id = required(&parsed.call_id, "callId")?;
    to_json(&staff_calls::get_staff_call(db, &call_id)?)
}

pub(super) fn staff_call_list_pending(db: &DbState, arg: Value) -> EngineResult<Value> {
    let scope = parse_scope(arg)?;
    to_json(&staff_calls::list_pending_staff_calls(db, scope.as_deref())?)
}

pub(super) fn staff_call_water_acknowledged(
    db: &DbState,
    config: &AppConfig,
    arg: Value,
) -> EngineResult<Value> {
    let parsed: WaterAckPayload = parse_payload(arg, "tableNumber", "water acknowledgment")?;
    let restaurant_id = non_empty(parsed.restaurant_id);
    to_json(&staff_calls::get_water_acknowledged(
        db,
        restaurant_id.as_deref(),
        parsed.table_number,
        config.water_ack_window_secs,
        Utc::now(),
    )?)
}

pub(super) fn alert_counts(db: &DbState, arg: Value) -> EngineResult<Value> {
    let scope = parse_scope(arg)?;
    to_json(&staff_calls::alert_counts(db, scope.as_deref())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::error::EngineError;
    use crate::staff_calls::WATER_REASON;
    use serde_json::json;

    #[test]
    fn parse_create_payload_supports_aliases() {
        let parsed = parse_create_payload(json!({
            "table_id": 12,
            "table_number": 12,
            "zone": "VIP Lounge",
            "reason": "Bill please"
        }))
        .unwrap();
        assert_eq!(parsed.table_id, "12");
        assert_eq!(parsed.table_number, 12);
        assert_eq!(parsed.zone_name.as_deref(), Some("VIP Lounge"));
    }

    #[test]
    fn water_call_flow_through_commands() {
        let db = test_db();
        let config = AppConfig::default();
        let created = staff_call_create(
            &db,
            json!({ "tableId": "4", "tableNumber": 4, "reason": WATER_REASON }),
        )
        .unwrap();
        assert_eq!(created["call"]["status"], "pending");
        assert_eq!(created["notifications"], json!([]));
        let id = created["call"]["id"].as_str().unwrap().to_string();

        let pending = staff_call_list_pending(&db, Value::Null).unwrap();
        assert_eq!(pending.as_array().map(Vec::len), Some(1));
        assert_eq!(alert_counts(&db, json!({})).unwrap()["pendingCalls"], 1);

        let resolved =
            staff_call_update_status(&db, json!({ "callId": id, "status": "resolved" })).unwrap();
        assert!(resolved["acknowledgedAt"].is_string());

        let ack = staff_call_water_acknowledged(&db, &config, json!(4)).unwrap();
        assert_eq!(ack["id"], json!(id));

        let err = staff_call_update_status(&db, json!({ "id": id, "status": "acknowledged" }))
            .unwrap_err();
        assert!(matches!(err, EngineError::IllegalTransition { .. }));
    }

    #[test]
    fn unknown_call_status_rejected() {
        let db = test_db();
        let err = staff_call_update_status(&db, json!({ "callId": "x", "status": "done" }))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
