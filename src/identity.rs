//! Customer identity: maps an anonymous browsing session and/or a phone
//! number onto an order history.

use std::collections::HashSet;

use rusqlite::params;

use crate::db::DbState;
use crate::error::{EngineError, EngineResult};
use crate::orders::{list_orders_by_phone_conn, list_orders_by_session_conn, Order};

/// Canonical phone form: digits only, keeping a leading `+`.
/// Returns `None` when the input holds no digits.
pub fn normalize_phone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

/// Orders placed from `session_id` or under `phone`, newest first, without
/// duplicates.
pub fn order_history(
    db: &DbState,
    session_id: Option<&str>,
    phone: Option<&str>,
) -> EngineResult<Vec<Order>> {
    let session_id = session_id.map(str::trim).filter(|s| !s.is_empty());
    let phone = phone.and_then(normalize_phone);
    if session_id.is_none() && phone.is_none() {
        return Err(EngineError::validation(
            "A session id or phone number is required",
        ));
    }

    let conn = db.lock();
    let mut orders = Vec::new();
    if let Some(session_id) = session_id {
        orders.extend(list_orders_by_session_conn(&conn, session_id)?);
    }
    if let Some(phone) = phone.as_deref() {
        orders.extend(list_orders_by_phone_conn(&conn, phone)?);
    }

    let mut seen = HashSet::new();
    orders.retain(|o| seen.insert(o.id.clone()));
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
}

pub fn has_orders_for_session(db: &DbState, session_id: &str) -> EngineResult<bool> {
    let conn = db.lock();
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM orders WHERE customer_session_id = ?1)",
        params![session_id.trim()],
        |row| row.get(0),
    )?;
    Ok(exists)
}
