//! Order lifecycle: placement, numbering, status transitions and queries.
//!
//! **Rules:**
//! - Status only moves one step forward: pending -> preparing -> ready -> completed
//! - `completed` is terminal
//! - Payment status is independent of order status
//! - Order numbers are `pad2(table) + pad2(seq)`, issued from a per-table
//!   sequence row bumped inside the placement transaction
//! - Orders are never deleted

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::credit::{self, round_money};
use crate::db::{is_constraint_violation, now_ts, with_transaction, DbState};
use crate::error::{or_not_found, EngineError, EngineResult};
use crate::identity::normalize_phone;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Completed => "completed",
        }
    }

    /// The only state reachable from `self`, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    pub fn is_active(self) -> bool {
        self != Self::Completed
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::validation(format!(
                "Unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    PayNow,
    PayCounter,
    PayTable,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PayNow => "pay-now",
            Self::PayCounter => "pay-counter",
            Self::PayTable => "pay-table",
        }
    }

    /// Only prepaid orders start out paid.
    pub fn initial_payment_status(self) -> PaymentStatus {
        match self {
            Self::PayNow => PaymentStatus::Paid,
            Self::PayCounter | Self::PayTable => PaymentStatus::Pending,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pay-now" => Ok(Self::PayNow),
            "pay-counter" => Ok(Self::PayCounter),
            "pay-table" => Ok(Self::PayTable),
            other => Err(EngineError::validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Pending => "pending",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(Self::Paid),
            "pending" => Ok(Self::Pending),
            other => Err(EngineError::validation(format!(
                "Unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub menu_item_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OrderItem {
    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    pub table_id: String,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub customer_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_used: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// A placement request as received from a customer device.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub restaurant_id: Option<String>,
    pub table_id: String,
    pub items: Vec<OrderItem>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub customer_session_id: String,
    pub customer_phone: Option<String>,
    pub deposit_requested: Option<f64>,
}

const ORDER_COLUMNS: &str = "id, restaurant_id, table_id, order_number, items, total, status,
    payment_method, payment_status, notes, customer_session_id, customer_phone,
    deposit_used, created_at, updated_at";

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let items_json: String = row.get(4)?;
    let status: String = row.get(6)?;
    let method: String = row.get(7)?;
    let payment: String = row.get(8)?;

    Ok(Order {
        id: row.get(0)?,
        restaurant_id: row.get(1)?,
        table_id: row.get(2)?,
        order_number: row.get(3)?,
        items: serde_json::from_str(&items_json).map_err(|e| conversion_err(4, e))?,
        total: row.get(5)?,
        status: status.parse().map_err(|e| conversion_err(6, e))?,
        payment_method: method.parse().map_err(|e| conversion_err(7, e))?,
        payment_status: payment.parse().map_err(|e| conversion_err(8, e))?,
        notes: row.get(9)?,
        customer_session_id: row.get(10)?,
        customer_phone: row.get(11)?,
        deposit_used: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

// ---------------------------------------------------------------------------
// Numbering
// ---------------------------------------------------------------------------

/// `pad2(table) + pad2(seq)`. Padding only widens: table "123" stays "123".
pub fn format_order_number(table_id: &str, seq: i64) -> String {
    format!("{table_id:0>2}{seq:0>2}")
}

/// Issue the next sequence number for a table.
///
/// The row is seeded from the count of existing orders on first use, then
/// bumped atomically. Callers must hold a write transaction.
fn next_order_sequence(
    conn: &Connection,
    restaurant_id: Option<&str>,
    table_id: &str,
) -> EngineResult<i64> {
    let scope_key = restaurant_id.unwrap_or("");
    let seq = conn.query_row(
        "INSERT INTO order_sequences (scope_key, table_id, last_seq)
         VALUES (
            ?1, ?2,
            (SELECT COUNT(*) FROM orders
             WHERE COALESCE(restaurant_id, '') = ?1 AND table_id = ?2) + 1
         )
         ON CONFLICT(scope_key, table_id) DO UPDATE SET last_seq = last_seq + 1
         RETURNING last_seq",
        params![scope_key, table_id],
        |row| row.get(0),
    )?;
    Ok(seq)
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

fn validate_items(items: &[OrderItem]) -> EngineResult<()> {
    if items.is_empty() {
        return Err(EngineError::validation("Cart is empty"));
    }
    for item in items {
        if item.menu_item_id.trim().is_empty() {
            return Err(EngineError::validation("Order item is missing menuItemId"));
        }
        if item.quantity == 0 {
            return Err(EngineError::validation(format!(
                "Quantity for {} must be at least 1",
                item.name
            )));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(EngineError::validation(format!(
                "Price for {} must be a non-negative number",
                item.name
            )));
        }
    }
    Ok(())
}

/// Place an order.
///
/// Validation runs before any write. Credit deduction, sequence allocation
/// and the insert share one transaction.
pub fn place_order(db: &DbState, new: NewOrder) -> EngineResult<Order> {
    let table_id = new.table_id.trim().to_string();
    if table_id.is_empty() {
        return Err(EngineError::validation("Missing tableId"));
    }
    let session_id = new.customer_session_id.trim().to_string();
    if session_id.is_empty() {
        return Err(EngineError::validation("Missing customerSessionId"));
    }
    validate_items(&new.items)?;

    let phone = match new.customer_phone.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(
            normalize_phone(raw)
                .ok_or_else(|| EngineError::validation(format!("Invalid phone number: {raw}")))?,
        ),
        _ => None,
    };
    let deposit_requested = new.deposit_requested.unwrap_or(0.0);
    if !deposit_requested.is_finite() || deposit_requested < 0.0 {
        return Err(EngineError::validation("depositUsed must be a non-negative number"));
    }
    let notes = new
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let subtotal = round_money(new.items.iter().map(OrderItem::subtotal).sum());
    let payment_status = new.payment_method.initial_payment_status();
    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    let items_json = serde_json::to_string(&new.items)?;

    let conn = db.lock();
    let (order_number, total, deposit_used) = with_transaction(&conn, |tx| {
        let (total, deposit_used) = match phone.as_deref() {
            Some(p) => {
                let credit = credit::apply_credit(tx, p, deposit_requested, subtotal, &now)?;
                (credit.total, Some(credit.applied).filter(|a| *a > 0.0))
            }
            None => (subtotal, None),
        };

        let seq = next_order_sequence(tx, new.restaurant_id.as_deref(), &table_id)?;
        let order_number = format_order_number(&table_id, seq);

        tx.execute(
            "INSERT INTO orders (
                id, restaurant_id, table_id, order_number, items, total, status,
                payment_method, payment_status, notes, customer_session_id,
                customer_phone, deposit_used, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                id,
                new.restaurant_id,
                table_id,
                order_number,
                items_json,
                total,
                new.payment_method.as_str(),
                payment_status.as_str(),
                notes,
                session_id,
                phone,
                deposit_used,
                now,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                EngineError::Conflict(format!(
                    "order number {order_number} already issued for table {table_id}"
                ))
            } else {
                e.into()
            }
        })?;

        Ok((order_number, total, deposit_used))
    })?;

    info!(
        order_id = %id,
        order_number = %order_number,
        table_id = %table_id,
        total = %total,
        deposit_used = ?deposit_used,
        "Order placed"
    );

    Ok(Order {
        id,
        restaurant_id: new.restaurant_id,
        table_id,
        order_number,
        items: new.items,
        total,
        status: OrderStatus::Pending,
        payment_method: new.payment_method,
        payment_status,
        notes,
        customer_session_id: session_id,
        customer_phone: phone,
        deposit_used,
        created_at: now.clone(),
        updated_at: now,
    })
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

fn load_order(conn: &Connection, order_id: &str) -> EngineResult<Order> {
    or_not_found(
        conn.query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            params![order_id],
            order_from_row,
        ),
        "order",
        order_id,
    )
}

/// Move an order one step forward. Re-sending the current status is a no-op,
/// except on a completed order, which rejects every update.
pub fn update_order_status(
    db: &DbState,
    order_id: &str,
    target: OrderStatus,
) -> EngineResult<Order> {
    let conn = db.lock();
    with_transaction(&conn, |tx| {
        let mut order = load_order(tx, order_id)?;
        if order.status == OrderStatus::Completed {
            return Err(EngineError::illegal_transition("order", order.status, target));
        }
        if order.status == target {
            debug!(order_id = %order_id, status = %target, "Order status unchanged");
            return Ok(order);
        }
        if !order.status.can_transition_to(target) {
            return Err(EngineError::illegal_transition("order", order.status, target));
        }

        let now = now_ts();
        tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![target.as_str(), now, order_id],
        )?;

        info!(order_id = %order_id, from = %order.status, to = %target, "Order status updated");
        order.status = target;
        order.updated_at = now;
        Ok(order)
    })
}

pub fn update_payment_status(
    db: &DbState,
    order_id: &str,
    status: PaymentStatus,
) -> EngineResult<Order> {
    let conn = db.lock();
    let mut order = load_order(&conn, order_id)?;
    if order.payment_status == status {
        return Ok(order);
    }

    let now = now_ts();
    conn.execute(
        "UPDATE orders SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, order_id],
    )?;

    info!(order_id = %order_id, payment_status = status.as_str(), "Payment status updated");
    order.payment_status = status;
    order.updated_at = now;
    Ok(order)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn query_orders(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> EngineResult<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE {filter} ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, order_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_order(db: &DbState, order_id: &str) -> EngineResult<Order> {
    let conn = db.lock();
    load_order(&conn, order_id)
}

/// All orders, newest first, optionally scoped to one restaurant.
pub fn list_orders(db: &DbState, restaurant_id: Option<&str>) -> EngineResult<Vec<Order>> {
    let conn = db.lock();
    list_orders_conn(&conn, restaurant_id)
}

pub(crate) fn list_orders_conn(
    conn: &Connection,
    restaurant_id: Option<&str>,
) -> EngineResult<Vec<Order>> {
    query_orders(conn, "(?1 IS NULL OR restaurant_id = ?1)", &[&restaurant_id])
}

pub(crate) fn list_orders_by_session_conn(
    conn: &Connection,
    session_id: &str,
) -> EngineResult<Vec<Order>> {
    query_orders(conn, "customer_session_id = ?1", &[&session_id])
}

pub(crate) fn list_orders_by_phone_conn(conn: &Connection, phone: &str) -> EngineResult<Vec<Order>> {
    query_orders(conn, "customer_phone = ?1", &[&phone])
}

pub fn list_orders_by_session(db: &DbState, session_id: &str) -> EngineResult<Vec<Order>> {
    let conn = db.lock();
    list_orders_by_session_conn(&conn, session_id.trim())
}

pub fn list_orders_by_phone(db: &DbState, phone: &str) -> EngineResult<Vec<Order>> {
    let Some(phone) = normalize_phone(phone) else {
        return Ok(Vec::new());
    };
    let conn = db.lock();
    list_orders_by_phone_conn(&conn, &phone)
}

/// Most recent non-completed order for a table.
pub fn get_active_order_by_table(
    db: &DbState,
    restaurant_id: Option<&str>,
    table_id: &str,
) -> EngineResult<Option<Order>> {
    let conn = db.lock();
    let order = conn
        .query_row(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE table_id = ?1 AND status != 'completed'
                   AND (?2 IS NULL OR restaurant_id = ?2)
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![table_id.trim(), restaurant_id],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

/// Most recent non-completed order placed from a browsing session.
pub fn get_active_order_by_session(db: &DbState, session_id: &str) -> EngineResult<Option<Order>> {
    let conn = db.lock();
    let order = conn
        .query_row(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE customer_session_id = ?1 AND status != 'completed'
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![session_id.trim()],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

pub(crate) fn count_pending_orders(
    conn: &Connection,
    restaurant_id: Option<&str>,
) -> EngineResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM orders
         WHERE status = 'pending' AND (?1 IS NULL OR restaurant_id = ?1)",
        params![restaurant_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credit::{add_deposit, get_customer};
    use crate::db::test_db;

    pub(crate) fn item(name: &str, price: f64, quantity: u32) -> OrderItem {
        OrderItem {
            menu_item_id: format!("menu-{name}"),
            name: name.to_string(),
            price,
            quantity,
            image: None,
        }
    }

    pub(crate) fn new_order(table_id: &str, session: &str) -> NewOrder {
        NewOrder {
            restaurant_id: None,
            table_id: table_id.to_string(),
            items: vec![item("Margherita", 12.0, 2), item("Lemonade", 3.5, 1)],
            payment_method: PaymentMethod::PayCounter,
            notes: None,
            customer_session_id: session.to_string(),
            customer_phone: None,
            deposit_requested: None,
        }
    }

    #[test]
    fn test_format_order_number() {
        assert_eq!(format_order_number("5", 4), "0504");
        assert_eq!(format_order_number("12", 1), "1201");
        assert_eq!(format_order_number("123", 7), "12307");
        assert_eq!(format_order_number("5", 123), "05123");
    }

    #[test]
    fn test_order_number_follows_prior_count() {
        let db = test_db();
        for _ in 0..3 {
            place_order(&db, new_order("5", "sess-a")).unwrap();
        }
        let fourth = place_order(&db, new_order("5", "sess-b")).unwrap();
        assert_eq!(fourth.order_number, "0504");

        // Other tables keep their own sequence.
        let other = place_order(&db, new_order("7", "sess-c")).unwrap();
        assert_eq!(other.order_number, "0701");
    }

    #[test]
    fn test_sequence_seeded_from_existing_rows() {
        let db = test_db();
        {
            let conn = db.lock();
            for n in 1..=2 {
                conn.execute(
                    "INSERT INTO orders (id, table_id, order_number, items, total, payment_method,
                        payment_status, customer_session_id, created_at, updated_at)
                     VALUES (?1, '9', ?2, '[]', 0, 'pay-table', 'pending', 's',
                        '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                    params![format!("legacy-{n}"), format_order_number("9", n)],
                )
                .unwrap();
            }
        }
        let order = place_order(&db, new_order("9", "sess")).unwrap();
        assert_eq!(order.order_number, "0903");
    }

    #[test]
    fn test_sequence_is_scoped_per_restaurant() {
        let db = test_db();
        let mut a = new_order("3", "s1");
        a.restaurant_id = Some("rest-a".into());
        let mut b = new_order("3", "s2");
        b.restaurant_id = Some("rest-b".into());

        assert_eq!(place_order(&db, a).unwrap().order_number, "0301");
        assert_eq!(place_order(&db, b).unwrap().order_number, "0301");
    }

    #[test]
    fn test_place_order_totals_and_payment_status() {
        let db = test_db();
        let order = place_order(&db, new_order("2", "sess")).unwrap();
        assert_eq!(order.total, 27.5);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.deposit_used, None);

        let mut prepaid = new_order("2", "sess");
        prepaid.payment_method = PaymentMethod::PayNow;
        let order = place_order(&db, prepaid).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        let stored = get_order(&db, &order.id).unwrap();
        assert_eq!(stored, order);
    }

    #[test]
    fn test_empty_cart_rejected_without_writes() {
        let db = test_db();
        let mut empty = new_order("2", "sess");
        empty.items.clear();
        let err = place_order(&db, empty).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let conn = db.lock();
        let (orders, seqs): (i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM orders), (SELECT COUNT(*) FROM order_sequences)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((orders, seqs), (0, 0));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let db = test_db();
        let mut bad = new_order("2", "sess");
        bad.items = vec![item("Water", 1.0, 0)];
        assert!(matches!(
            place_order(&db, bad),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_deposit_applied_and_total_reduced() {
        let db = test_db();
        add_deposit(&db, "+15550100", 100.0).unwrap();

        let mut order = new_order("4", "sess");
        order.items = vec![item("Tasting menu", 200.0, 1)];
        order.customer_phone = Some("+1 (555) 0100".into());
        order.deposit_requested = Some(150.0);

        let placed = place_order(&db, order).unwrap();
        assert_eq!(placed.deposit_used, Some(100.0));
        assert_eq!(placed.total, 100.0);
        assert_eq!(placed.customer_phone.as_deref(), Some("+15550100"));

        let customer = get_customer(&db, "+15550100").unwrap();
        assert_eq!(customer.deposit_balance, 0.0);
        assert_eq!(customer.total_visits, 1);
        assert_eq!(customer.total_spent, 100.0);
    }

    #[test]
    fn test_failed_insert_rolls_back_credit() {
        let db = test_db();
        add_deposit(&db, "+15550111", 50.0).unwrap();
        {
            // Occupy the number the next placement will be issued.
            let conn = db.lock();
            conn.execute(
                "INSERT INTO order_sequences (scope_key, table_id, last_seq) VALUES ('', '6', 0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO orders (id, table_id, order_number, items, total, payment_method,
                    payment_status, customer_session_id, created_at, updated_at)
                 VALUES ('squatter', '6', '0601', '[]', 0, 'pay-table', 'pending', 's',
                    '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();
        }

        let mut order = new_order("6", "sess");
        order.customer_phone = Some("+15550111".into());
        order.deposit_requested = Some(20.0);
        let err = place_order(&db, order).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let customer = get_customer(&db, "+15550111").unwrap();
        assert_eq!(customer.deposit_balance, 50.0);
        assert_eq!(customer.total_visits, 0);
    }

    #[test]
    fn test_status_walks_forward_only() {
        let db = test_db();
        let order = place_order(&db, new_order("1", "sess")).unwrap();

        let err = update_order_status(&db, &order.id, OrderStatus::Ready).unwrap_err();
        assert!(matches!(err, EngineError::IllegalTransition { .. }));

        for status in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            let updated = update_order_status(&db, &order.id, status).unwrap();
            assert_eq!(updated.status, status);
        }

        let err = update_order_status(&db, &order.id, OrderStatus::Pending).unwrap_err();
        assert!(matches!(err, EngineError::IllegalTransition { .. }));
        assert_eq!(
            get_order(&db, &order.id).unwrap().status,
            OrderStatus::Completed
        );
    }

    #[test]
    fn test_completed_rejects_every_target() {
        let db = test_db();
        let order = place_order(&db, new_order("1", "sess")).unwrap();
        for status in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            update_order_status(&db, &order.id, status).unwrap();
        }
        let completed = get_order(&db, &order.id).unwrap();

        for target in [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            let err = update_order_status(&db, &order.id, target).unwrap_err();
            assert!(matches!(err, EngineError::IllegalTransition { .. }));
        }
        assert_eq!(get_order(&db, &order.id).unwrap(), completed);
    }

    #[test]
    fn test_same_status_is_noop() {
        let db = test_db();
        let order = place_order(&db, new_order("1", "sess")).unwrap();
        let same = update_order_status(&db, &order.id, OrderStatus::Pending).unwrap();
        assert_eq!(same.updated_at, order.updated_at);
    }

    #[test]
    fn test_unknown_order_not_found() {
        let db = test_db();
        assert!(matches!(
            update_order_status(&db, "missing", OrderStatus::Preparing),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            update_payment_status(&db, "missing", PaymentStatus::Paid),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_payment_status_independent_of_order_status() {
        let db = test_db();
        let order = place_order(&db, new_order("1", "sess")).unwrap();
        update_order_status(&db, &order.id, OrderStatus::Preparing).unwrap();

        let paid = update_payment_status(&db, &order.id, PaymentStatus::Paid).unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.status, OrderStatus::Preparing);
    }

    #[test]
    fn test_list_by_phone_is_stable() {
        let db = test_db();
        for table in ["1", "2", "3"] {
            let mut order = new_order(table, "sess");
            order.customer_phone = Some("+15550123".into());
            place_order(&db, order).unwrap();
        }
        place_order(&db, new_order("4", "other")).unwrap();

        let first = list_orders_by_phone(&db, "+1 555 0123").unwrap();
        let second = list_orders_by_phone(&db, "+15550123").unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[0].table_id, "3");
    }

    #[test]
    fn test_active_order_lookups() {
        let db = test_db();
        let first = place_order(&db, new_order("8", "sess-8")).unwrap();
        for status in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            update_order_status(&db, &first.id, status).unwrap();
        }
        assert!(get_active_order_by_table(&db, None, "8").unwrap().is_none());
        assert!(get_active_order_by_session(&db, "sess-8").unwrap().is_none());

        let second = place_order(&db, new_order("8", "sess-8")).unwrap();
        assert_eq!(
            get_active_order_by_table(&db, None, "8").unwrap().map(|o| o.id),
            Some(second.id.clone())
        );
        assert_eq!(
            get_active_order_by_session(&db, "sess-8").unwrap().map(|o| o.id),
            Some(second.id)
        );
    }

    #[test]
    fn test_list_orders_scoped_by_restaurant() {
        let db = test_db();
        let mut a = new_order("1", "s");
        a.restaurant_id = Some("rest-a".into());
        place_order(&db, a).unwrap();
        place_order(&db, new_order("1", "s")).unwrap();

        assert_eq!(list_orders(&db, None).unwrap().len(), 2);
        assert_eq!(list_orders(&db, Some("rest-a")).unwrap().len(), 1);
        assert_eq!(list_orders(&db, Some("rest-b")).unwrap().len(), 0);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Preparing".parse::<OrderStatus>().unwrap(), OrderStatus::Preparing);
        assert!("cancelled".parse::<OrderStatus>().is_err());
        assert_eq!("pay_now".parse::<PaymentMethod>().unwrap(), PaymentMethod::PayNow);
    }

    #[test]
    fn test_concurrent_placements_share_one_sequence_and_balance() {
        use std::sync::Arc;
        use std::thread;

        let dir = std::env::temp_dir().join(format!("tableside-orders-{}", Uuid::new_v4()));
        let db = Arc::new(crate::db::init(&dir).unwrap());
        add_deposit(&db, "+15550100", 50.0).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    let mut order = new_order("5", &format!("sess-{i}"));
                    order.customer_phone = Some("+15550100".into());
                    order.deposit_requested = Some(10.0);
                    place_order(&db, order).unwrap()
                })
            })
            .collect();
        let orders: Vec<Order> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut numbers: Vec<String> = orders.iter().map(|o| o.order_number.clone()).collect();
        numbers.sort();
        let expected: Vec<String> = (1..=16).map(|n| format_order_number("5", n)).collect();
        assert_eq!(numbers, expected);

        let used: f64 = orders.iter().map(|o| o.deposit_used.unwrap_or(0.0)).sum();
        assert!((used - 50.0).abs() < 1e-9);
        assert_eq!(get_customer(&db, "+15550100").unwrap().deposit_balance, 0.0);
        assert_eq!(get_customer(&db, "+15550100").unwrap().total_visits, 16);

        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
