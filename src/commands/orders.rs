use serde::Deserialize;
use serde_json::Value;

use super::{non_empty, parse_payload, parse_scope, required, string_or_number, to_json};
use crate::db::DbState;
use crate::error::EngineResult;
use crate::identity;
use crate::orders::{self, NewOrder, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderPayload {
    #[serde(default, alias = "restaurant_id")]
    restaurant_id: Option<String>,
    #[serde(alias = "table_id", deserialize_with = "string_or_number")]
    table_id: String,
    #[serde(default)]
    items: Vec<OrderItem>,
    #[serde(alias = "payment_method")]
    payment_method: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(alias = "customer_session_id", alias = "sessionId")]
    customer_session_id: String,
    #[serde(default, alias = "customer_phone", alias = "phone")]
    customer_phone: Option<String>,
    #[serde(default, alias = "deposit_used", alias = "depositRequested")]
    deposit_used: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderIdPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    #[serde(alias = "payment_status", alias = "status")]
    payment_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(alias = "session_id", alias = "customerSessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhonePayload {
    #[serde(alias = "customerPhone", alias = "customer_phone")]
    phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveByTablePayload {
    #[serde(default, alias = "restaurant_id")]
    restaurant_id: Option<String>,
    #[serde(alias = "table_id", deserialize_with = "string_or_number")]
    table_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPayload {
    #[serde(default, alias = "session_id", alias = "customerSessionId")]
    session_id: Option<String>,
    #[serde(default, alias = "customerPhone", alias = "customer_phone")]
    phone: Option<String>,
}

fn parse_place_payload(arg: Value) -> EngineResult<NewOrder> {
    let parsed: PlaceOrderPayload = parse_payload(arg, "tableId", "order")?;
    let payment_method: PaymentMethod = parsed.payment_method.parse()?;
    Ok(NewOrder {
        restaurant_id: non_empty(parsed.restaurant_id),
        table_id: parsed.table_id,
        items: parsed.items,
        payment_method,
        notes: parsed.notes,
        customer_session_id: parsed.customer_session_id,
        customer_phone: parsed.customer_phone,
        deposit_requested: parsed.deposit_used,
    })
}

fn parse_order_id(arg: Value) -> EngineResult<String> {
    let parsed: OrderIdPayload = parse_payload(arg, "orderId", "order id")?;
    required(&parsed.order_id, "orderId")
}

fn parse_session(arg: Value) -> EngineResult<String> {
    let parsed: SessionPayload = parse_payload(arg, "sessionId", "session")?;
    required(&parsed.session_id, "sessionId")
}

pub(super) fn order_place(db: &DbState, arg: Value) -> EngineResult<Value> {
    let new = parse_place_payload(arg)?;
    to_json(&orders::place_order(db, new)?)
}

pub(super) fn order_update_status(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: OrderStatusPayload = parse_payload(arg, "orderId", "order status")?;
    let order_id = required(&parsed.order_id, "orderId")?;
    let status: OrderStatus = parsed.status.parse()?;
    to_json(&orders::update_order_status(db, &order_id, status)?)
}

pub(super) fn order_update_payment_status(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: PaymentStatusPayload = parse_payload(arg, "orderId", "payment status")?;
    let order_id = required(&parsed.order_id, "orderId")?;
    let status: PaymentStatus = parsed.payment_status.parse()?;
    to_json(&orders::update_payment_status(db, &order_id, status)?)
}

pub(super) fn order_get(db: &DbState, arg: Value) -> EngineResult<Value> {
    let order_id = parse_order_id(arg)?;
    to_json(&orders::get_order(db, &order_id)?)
}

pub(super) fn order_list(db: &DbState, arg: Value) -> EngineResult<Value> {
    let scope = parse_scope(arg)?;
    to_json(&orders::list_orders(db, scope.as_deref())?)
}

pub(super) fn order_list_by_session(db: &DbState, arg: Value) -> EngineResult<Value> {
    let session_id = parse_session(arg)?;
    to_json(&orders::list_orders_by_session(db, &session_id)?)
}

pub(super) fn order_list_by_phone(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: PhonePayload = parse_payload(arg, "phone", "phone")?;
    let phone = required(&parsed.phone, "phone")?;
    to_json(&orders::list_orders_by_phone(db, &phone)?)
}

pub(super) fn order_get_active_by_table(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: ActiveByTablePayload = parse_payload(arg, "tableId", "table")?;
    let table_id = required(&parsed.table_id, "tableId")?;
    let restaurant_id = non_empty(parsed.restaurant_id);
    to_json(&orders::get_active_order_by_table(
        db,
        restaurant_id.as_deref(),
        &table_id,
    )?)
}

pub(super) fn order_get_active_by_session(db: &DbState, arg: Value) -> EngineResult<Value> {
    let session_id = parse_session(arg)?;
    to_json(&orders::get_active_order_by_session(db, &session_id)?)
}

pub(super) fn order_history(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: HistoryPayload = parse_payload(arg, "sessionId", "order history")?;
    to_json(&identity::order_history(
        db,
        parsed.session_id.as_deref(),
        parsed.phone.as_deref(),
    )?)
}

pub(super) fn session_has_orders(db: &DbState, arg: Value) -> EngineResult<Value> {
    let session_id = parse_session(arg)?;
    Ok(Value::Bool(identity::has_orders_for_session(db, &session_id)?))
}
