//! Customer deposit (credit) ledger.
//!
//! **Rules:**
//! - `deposit_balance` never goes negative: a requested deduction is clamped
//!   to the current balance (and to the order subtotal, so totals stay >= 0)
//! - The deduction, visit count and spend update run on the caller's
//!   transaction together with the order insert
//! - There is no reversal path for consumed credit

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{now_ts, DbState};
use crate::error::{or_not_found, EngineError, EngineResult};
use crate::identity::normalize_phone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub phone: String,
    pub deposit_balance: f64,
    pub total_visits: i64,
    pub total_spent: f64,
    pub last_visit: Option<String>,
}

/// Outcome of applying credit to one order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditApplication {
    pub applied: f64,
    /// Order total after credit.
    pub total: f64,
}

pub(crate) fn round_money(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        phone: row.get(0)?,
        deposit_balance: row.get(1)?,
        total_visits: row.get(2)?,
        total_spent: row.get(3)?,
        last_visit: row.get(4)?,
    })
}

/// Record an identified visit and consume up to `requested` credit.
///
/// Must run inside the order-placement transaction. The customer row is
/// created on first sight with a zero balance, so an unknown phone applies 0.
pub(crate) fn apply_credit(
    conn: &Connection,
    phone: &str,
    requested: f64,
    order_subtotal: f64,
    at: &str,
) -> EngineResult<CreditApplication> {
    conn.execute(
        "INSERT OR IGNORE INTO customers (phone, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![phone, at],
    )?;

    let balance: f64 = conn.query_row(
        "SELECT deposit_balance FROM customers WHERE phone = ?1",
        params![phone],
        |row| row.get(0),
    )?;

    let applied = if requested > 0.0 {
        round_money(requested.min(balance).min(order_subtotal).max(0.0))
    } else {
        0.0
    };
    let total = round_money((order_subtotal - applied).max(0.0));

    conn.execute(
        "UPDATE customers SET
            deposit_balance = MAX(deposit_balance - ?1, 0),
            total_visits = total_visits + 1,
            total_spent = total_spent + ?2,
            last_visit = ?3,
            updated_at = ?3
         WHERE phone = ?4",
        params![applied, total, at, phone],
    )?;

    if applied > 0.0 {
        info!(
            phone = %phone,
            requested = %requested,
            applied = %applied,
            remaining = %round_money(balance - applied),
            "Deposit credit applied"
        );
    }

    Ok(CreditApplication { applied, total })
}

pub fn get_customer(db: &DbState, phone: &str) -> EngineResult<Customer> {
    let phone = normalize_phone(phone)
        .ok_or_else(|| EngineError::validation("A phone number is required"))?;
    let conn = db.lock();
    or_not_found(
        conn.query_row(
            "SELECT phone, deposit_balance, total_visits, total_spent, last_visit
             FROM customers WHERE phone = ?1",
            params![phone],
            customer_from_row,
        ),
        "customer",
        &phone,
    )
}

/// Admin top-up of a customer's deposit. Creates the customer when absent.
pub fn add_deposit(db: &DbState, phone: &str, amount: f64) -> EngineResult<Customer> {
    let phone = normalize_phone(phone)
        .ok_or_else(|| EngineError::validation("A phone number is required"))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::validation("Deposit amount must be positive"));
    }
    let amount = round_money(amount);
    let now = now_ts();

    let conn = db.lock();
    conn.execute(
        "INSERT INTO customers (phone, deposit_balance, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(phone) DO UPDATE SET
            deposit_balance = deposit_balance + excluded.deposit_balance,
            updated_at = excluded.updated_at",
        params![phone, amount, now],
    )?;

    let customer = conn
        .query_row(
            "SELECT phone, deposit_balance, total_visits, total_spent, last_visit
             FROM customers WHERE phone = ?1",
            params![phone],
            customer_from_row,
        )
        .optional()?
        .ok_or_else(|| EngineError::Internal("customer vanished after upsert".into()))?;

    info!(phone = %phone, amount = %amount, balance = %customer.deposit_balance, "Deposit added");
    Ok(customer)
}

// ===========================================================================
// Tests
// ===========================================================================
