use serde::Deserialize;
use serde_json::Value;

use super::{parse_payload, required, to_json};
use crate::db::DbState;
use crate::error::EngineResult;
use crate::restaurants;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRestaurantPayload {
    #[serde(default, alias = "restaurantName")]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortIdPayload {
    #[serde(alias = "short_id", alias = "id")]
    short_id: String,
}

pub(super) fn restaurant_create(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: CreateRestaurantPayload = parse_payload(arg, "name", "restaurant")?;
    to_json(&restaurants::create_restaurant(db, &parsed.name)?)
}

pub(super) fn restaurant_get_by_short_id(db: &DbState, arg: Value) -> EngineResult<Value> {
    let parsed: ShortIdPayload = parse_payload(arg, "shortId", "short id")?;
    let short_id = required(&parsed.short_id, "shortId")?;
    to_json(&restaurants::get_restaurant_by_short_id(db, &short_id)?)
}
