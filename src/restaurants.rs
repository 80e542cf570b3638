//! Restaurant tenants and their public short ids.
//!
//! The short id is what the table QR codes carry. It is generated at signup;
//! a collision is retried with a fresh id a bounded number of times.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{is_constraint_violation, now_ts, DbState};
use crate::error::{or_not_found, EngineError, EngineResult};

pub const SHORT_ID_LEN: usize = 6;
pub const MAX_SHORT_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub created_at: String,
}

fn restaurant_from_row(row: &Row<'_>) -> rusqlite::Result<Restaurant> {
    Ok(Restaurant {
        id: row.get(0)?,
        short_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Random uppercase hex id of `SHORT_ID_LEN` characters.
pub fn generate_short_id() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SHORT_ID_LEN)
        .collect::<String>()
        .to_ascii_uppercase()
}

pub fn create_restaurant(db: &DbState, name: &str) -> EngineResult<Restaurant> {
    create_restaurant_with(db, name, generate_short_id)
}

/// Signup with an injectable id source.
pub(crate) fn create_restaurant_with(
    db: &DbState,
    name: &str,
    mut next_short_id: impl FnMut() -> String,
) -> EngineResult<Restaurant> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("Restaurant name is required"));
    }

    let conn = db.lock();
    let id = Uuid::new_v4().to_string();
    let created_at = now_ts();

    for attempt in 1..=MAX_SHORT_ID_ATTEMPTS {
        let short_id = next_short_id();
        match conn.execute(
            "INSERT INTO restaurants (id, short_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, short_id, name, created_at],
        ) {
            Ok(_) => {
                info!(restaurant_id = %id, short_id = %short_id, "Restaurant created");
                return Ok(Restaurant {
                    id,
                    short_id,
                    name: name.to_string(),
                    created_at,
                });
            }
            Err(e) if is_constraint_violation(&e) => {
                warn!(attempt, short_id = %short_id, "Short id collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(EngineError::Conflict(format!(
        "no unique short id after {MAX_SHORT_ID_ATTEMPTS} attempts"
    )))
}

pub fn get_restaurant_by_short_id(db: &DbState, short_id: &str) -> EngineResult<Restaurant> {
    let short_id = short_id.trim().to_ascii_uppercase();
    let conn = db.lock();
    or_not_found(
        conn.query_row(
            "SELECT id, short_id, name, created_at FROM restaurants WHERE short_id = ?1",
            params![short_id],
            restaurant_from_row,
        ),
        "restaurant",
        &short_id,
    )
}

// ===========================================================================
// Tests
// ===========================================================================
