use serde::Deserialize;
use serde_json::Value;

use super::{parse_payload, required, to_json};
use crate::credit;
use crate::db::DbState;
use crate::error::EngineResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerPhonePayload {
    #[serde(alias = "customerPhone", alias = "customer_phone", alias = "mobile")]
    phone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositPayload {
    #[serde(alias = "customerPhone", alias = "customer_phone")]
    phone: String,
    amount: f64,
}

pub(super) fn customer_get(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: CustomerPhonePayload = parse_payload(arg, "phone", "phone")?;
    let phone = required(&parsed.phone, "phone")?;
    to_json(&credit::get_customer(db, &phone)?)
}

pub(super) fn customer_add_deposit(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: DepositPayload = parse_payload(arg, "phone", "deposit")?;
    let phone = required(&parsed.phone, "phone")?;
    to_json(&credit::add_deposit(db, &phone, parsed.amount)?)
}
