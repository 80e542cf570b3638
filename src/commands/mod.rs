//! Command surface.
//!
//! Every operation is addressed by a snake_case command name and takes one
//! JSON payload. Payload keys are camelCase with snake_case aliases. Commands
//! whose payload is a single id also accept that id as a bare string.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;
use crate::db::DbState;
use crate::error::{EngineError, EngineResult};

mod customers;
mod notifications;
mod orders;
mod restaurants;
mod staff;
mod staff_calls;
mod workload;

/// Every command name served by [`dispatch`].
pub const COMMANDS: &[&str] = &[
    "order_place",
    "order_update_status",
    "order_update_payment_status",
    "order_get",
    "order_list",
    "order_list_by_session",
    "order_list_by_phone",
    "order_get_active_by_table",
    "order_get_active_by_session",
    "order_history",
    "session_has_orders",
    "staff_call_create",
    "staff_call_update_status",
    "staff_call_get",
    "staff_call_list_pending",
    "staff_call_water_acknowledged",
    "alert_counts",
    "staff_create",
    "staff_update",
    "staff_toggle_active",
    "staff_remove",
    "staff_set_offline",
    "staff_heartbeat",
    "staff_list",
    "staff_get",
    "notification_list_unread",
    "notification_list",
    "notification_mark_read",
    "notification_mark_all_read",
    "workload_report",
    "workload_apply_rebalance",
    "restaurant_create",
    "restaurant_get_by_short_id",
    "customer_get",
    "customer_add_deposit",
];

pub fn dispatch(
    db: &DbState,
    config: &AppConfig,
    command: &str,
    payload: Value,
) -> EngineResult<Value> {
    debug!(command = %command, "Dispatching command");
    match command {
        "order_place" => orders::order_place(db, payload),
        "order_update_status" => orders::order_update_status(db, payload),
        "order_update_payment_status" => orders::order_update_payment_status(db, payload),
        "order_get" => orders::order_get(db, payload),
        "order_list" => orders::order_list(db, payload),
        "order_list_by_session" => orders::order_list_by_session(db, payload),
        "order_list_by_phone" => orders::order_list_by_phone(db, payload),
        "order_get_active_by_table" => orders::order_get_active_by_table(db, payload),
        "order_get_active_by_session" => orders::order_get_active_by_session(db, payload),
        "order_history" => orders::order_history(db, payload),
        "session_has_orders" => orders::session_has_orders(db, payload),

        "staff_call_create" => staff_calls::staff_call_create(db, payload),
        "staff_call_update_status" => staff_calls::staff_call_update_status(db, payload),
        "staff_call_get" => staff_calls::staff_call_get(db, payload),
        "staff_call_list_pending" => staff_calls::staff_call_list_pending(db, payload),
        "staff_call_water_acknowledged" => {
            staff_calls::staff_call_water_acknowledged(db, config, payload)
        }
        "alert_counts" => staff_calls::alert_counts(db, payload),

        "staff_create" => staff::staff_create(db, payload),
        "staff_update" => staff::staff_update(db, payload),
        "staff_toggle_active" => staff::staff_toggle_active(db, payload),
        "staff_remove" => staff::staff_remove(db, payload),
        "staff_set_offline" => staff::staff_set_offline(db, payload),
        "staff_heartbeat" => staff::staff_heartbeat(db, payload),
        "staff_list" => staff::staff_list(db, payload),
        "staff_get" => staff::staff_get(db, payload),

        "notification_list_unread" => notifications::notification_list_unread(db, payload),
        "notification_list" => notifications::notification_list(db, payload),
        "notification_mark_read" => notifications::notification_mark_read(db, payload),
        "notification_mark_all_read" => notifications::notification_mark_all_read(db, payload),

        "workload_report" => workload::workload_report(db, payload),
        "workload_apply_rebalance" => workload::workload_apply_rebalance(db, payload),

        "restaurant_create" => restaurants::restaurant_create(db, payload),
        "restaurant_get_by_short_id" => restaurants::restaurant_get_by_short_id(db, payload),

        "customer_get" => customers::customer_get(db, payload),
        "customer_add_deposit" => customers::customer_add_deposit(db, payload),

        other => Err(EngineError::not_found("command", other)),
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// Wrap a bare scalar payload as `{ key: value }`.
pub(crate) fn keyed_payload(arg: Value, key: &str) -> Value {
    match arg {
        Value::Object(obj) => Value::Object(obj),
        Value::Null => Value::Object(serde_json::Map::new()),
        other => {
            let mut obj = serde_json::Map::new();
            obj.insert(key.to_string(), other);
            Value::Object(obj)
        }
    }
}

pub(crate) fn parse_payload<T: DeserializeOwned>(
    arg: Value,
    key: &str,
    what: &str,
) -> EngineResult<T> {
    serde_json::from_value(keyed_payload(arg, key))
        .map_err(|e| EngineError::validation(format!("Invalid {what} payload: {e}")))
}

/// Trimmed, non-empty string or a validation error naming `field`.
pub(crate) fn required(value: &str, field: &str) -> EngineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation(format!("Missing {field}")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> EngineResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Table ids arrive as `"5"` or `5` depending on the client.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Shared `{ restaurantId? }` payload for scoped list commands.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScopePayload {
    #[serde(default, alias = "restaurant_id")]
    pub restaurant_id: Option<String>,
}

pub(crate) fn parse_scope(arg: Value) -> EngineResult<Option<String>> {
    let parsed: ScopePayload = parse_payload(arg, "restaurantId", "scope")?;
    Ok(non_empty(parsed.restaurant_id))
}
