//! Advisory workload balancing across staff.
//!
//! The report is recomputed from a fresh staff + orders snapshot on every
//! request and nothing about it is stored. Suggestions for different
//! (overloaded, underloaded) pairs may overlap; applying one re-checks that
//! the table is still where the suggestion says it is.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credit::round_money;
use crate::db::{now_ts, with_transaction, DbState};
use crate::error::{EngineError, EngineResult};
use crate::orders::{list_orders_conn, Order, OrderStatus};
use crate::staff::{list_staff_conn, load_staff, set_assigned_tables, Staff};

const IMBALANCE_RATIO: f64 = 0.5;
const OVERLOAD_RATIO: f64 = 1.3;
const UNDERLOAD_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    Overloaded,
    Balanced,
    Underloaded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableLoad {
    pub table_number: i64,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffWorkload {
    pub staff_id: String,
    pub name: String,
    pub assigned_tables: Vec<i64>,
    pub tables: Vec<TableLoad>,
    pub total_orders: usize,
    pub total_revenue: f64,
    pub active_orders: usize,
    pub load: LoadLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSuggestion {
    pub table_number: i64,
    pub from_staff_id: String,
    pub to_staff_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadReport {
    pub staff: Vec<StaffWorkload>,
    pub total_orders: usize,
    pub avg_orders_per_staff: f64,
    pub imbalanced: bool,
    pub suggestions: Vec<RebalanceSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceOutcome {
    pub from: Staff,
    pub to: Staff,
}

fn order_table(order: &Order) -> Option<i64> {
    order.table_id.trim().parse().ok()
}

fn staff_workload(staff: &Staff, orders: &[Order]) -> StaffWorkload {
    let mine: Vec<&Order> = orders
        .iter()
        .filter(|o| order_table(o).is_some_and(|t| staff.covers_table(t)))
        .collect();

    let tables = staff
        .assigned_tables
        .iter()
        .map(|&table_number| TableLoad {
            table_number,
            orders: mine
                .iter()
                .filter(|o| order_table(o) == Some(table_number))
                .count(),
        })
        .collect();

    let total_revenue = mine
        .iter()
        .filter(|o| o.status == OrderStatus::Completed)
        .map(|o| o.total)
        .sum::<f64>();

    StaffWorkload {
        staff_id: staff.id.clone(),
        name: staff.name.clone(),
        assigned_tables: staff.assigned_tables.clone(),
        tables,
        total_orders: mine.len(),
        total_revenue: round_money(total_revenue),
        active_orders: mine.iter().filter(|o| o.status.is_active()).count(),
        load: LoadLevel::Balanced,
    }
}

/// Table with the fewest orders, lowest number on ties.
fn least_busy_table(workload: &StaffWorkload) -> Option<&TableLoad> {
    workload
        .tables
        .iter()
        .min_by_key(|t| (t.orders, t.table_number))
}

/// Build the report for a staff + orders snapshot.
pub fn compute_workload(staff: &[Staff], orders: &[Order]) -> WorkloadReport {
    let mut rows: Vec<StaffWorkload> = staff.iter().map(|s| staff_workload(s, orders)).collect();

    let total_orders: usize = rows.iter().map(|r| r.total_orders).sum();
    let avg = if rows.is_empty() {
        0.0
    } else {
        total_orders as f64 / rows.len() as f64
    };

    let max = rows.iter().map(|r| r.total_orders).max().unwrap_or(0);
    let min = rows.iter().map(|r| r.total_orders).min().unwrap_or(0);
    let imbalanced = rows.len() > 1 && (max - min) as f64 > avg * IMBALANCE_RATIO;

    for row in &mut rows {
        let n = row.total_orders as f64;
        row.load = if n > avg * OVERLOAD_RATIO {
            LoadLevel::Overloaded
        } else if n < avg * UNDERLOAD_RATIO {
            LoadLevel::Underloaded
        } else {
            LoadLevel::Balanced
        };
    }

    let mut suggestions = Vec::new();
    for over in rows.iter().filter(|r| r.load == LoadLevel::Overloaded) {
        let Some(table) = least_busy_table(over) else {
            continue;
        };
        for under in rows.iter().filter(|r| r.load == LoadLevel::Underloaded) {
            if under.assigned_tables.contains(&table.table_number) {
                continue;
            }
            suggestions.push(RebalanceSuggestion {
                table_number: table.table_number,
                from_staff_id: over.staff_id.clone(),
                to_staff_id: under.staff_id.clone(),
                reason: format!(
                    "{} has {} orders vs {} for {}; move table {} ({} orders)",
                    over.name,
                    over.total_orders,
                    under.total_orders,
                    under.name,
                    table.table_number,
                    table.orders
                ),
            });
        }
    }

    WorkloadReport {
        staff: rows,
        total_orders,
        avg_orders_per_staff: avg,
        imbalanced,
        suggestions,
    }
}

/// Report over active staff and all orders of a restaurant, both read under
/// one lock so no write lands between them.
pub fn workload_report(db: &DbState, restaurant_id: Option<&str>) -> EngineResult<WorkloadReport> {
    let (staff, orders) = {
        let conn = db.lock();
        (
            list_staff_conn(&conn, restaurant_id, true)?,
            list_orders_conn(&conn, restaurant_id)?,
        )
    };
    let report = compute_workload(&staff, &orders);
    debug!(
        staff = report.staff.len(),
        total_orders = report.total_orders,
        imbalanced = report.imbalanced,
        suggestions = report.suggestions.len(),
        "Workload report computed"
    );
    Ok(report)
}

/// Move one table between staff in a single transaction.
///
/// Fails with `Conflict` when the suggestion no longer matches the current
/// assignments, e.g. after another suggestion for the same table was applied.
pub fn apply_rebalance(
    db: &DbState,
    suggestion: &RebalanceSuggestion,
) -> EngineResult<RebalanceOutcome> {
    if suggestion.from_staff_id == suggestion.to_staff_id {
        return Err(EngineError::validation(
            "Source and target staff must differ",
        ));
    }
    let table = suggestion.table_number;

    let conn = db.lock();
    let outcome = with_transaction(&conn, |tx| {
        let mut from = load_staff(tx, &suggestion.from_staff_id)?;
        let mut to = load_staff(tx, &suggestion.to_staff_id)?;
        if !from.covers_table(table) {
            return Err(EngineError::Conflict(format!(
                "Table {table} is no longer assigned to {}",
                from.name
            )));
        }
        if to.covers_table(table) {
            return Err(EngineError::Conflict(format!(
                "Table {table} is already assigned to {}",
                to.name
            )));
        }
        if !to.active {
            return Err(EngineError::Conflict(format!("{} is not active", to.name)));
        }

        let now = now_ts();
        let remaining: Vec<i64> = from
            .assigned_tables
            .iter()
            .copied()
            .filter(|t| *t != table)
            .collect();
        let mut added = to.assigned_tables.clone();
        added.push(table);

        set_assigned_tables(tx, &mut from, &remaining, &now)?;
        set_assigned_tables(tx, &mut to, &added, &now)?;
        Ok(RebalanceOutcome { from, to })
    })?;

    info!(
        table_number = table,
        from_staff_id = %outcome.from.id,
        to_staff_id = %outcome.to.id,
        "Table reassigned by rebalance"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::orders::tests::new_order;
    use crate::orders::{place_order, update_order_status};
    use crate::staff::create_staff;
    use crate::staff::tests::waiter;

    fn place_n(db: &DbState, table: &str, n: usize) -> Vec<Order> {
        (0..n)
            .map(|_| place_order(db, new_order(table, "sess")).unwrap())
            .collect()
    }

    #[test]
    fn test_imbalanced_ten_vs_two() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[1, 2])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[3])).unwrap();
        place_n(&db, "1", 7);
        place_n(&db, "2", 3);
        place_n(&db, "3", 2);

        let report = workload_report(&db, None).unwrap();
        assert_eq!(report.total_orders, 12);
        assert_eq!(report.avg_orders_per_staff, 6.0);
        assert!(report.imbalanced);
        assert_eq!(report.staff[0].load, LoadLevel::Overloaded);
        assert_eq!(report.staff[1].load, LoadLevel::Underloaded);

        assert_eq!(report.suggestions.len(), 1);
        let s = &report.suggestions[0];
        assert_eq!(s.table_number, 2);
        assert_eq!(s.from_staff_id, a.id);
        assert_eq!(s.to_staff_id, b.id);
    }

    #[test]
    fn test_balanced_six_vs_five() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[1])).unwrap();
        create_staff(&db, waiter("Ben", &[2])).unwrap();
        place_n(&db, "1", 6);
        place_n(&db, "2", 5);

        let report = workload_report(&db, None).unwrap();
        assert_eq!(report.avg_orders_per_staff, 5.5);
        assert!(!report.imbalanced);
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_single_staff_never_imbalanced() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[1])).unwrap();
        place_n(&db, "1", 4);
        let report = workload_report(&db, None).unwrap();
        assert!(!report.imbalanced);
        assert_eq!(report.staff[0].load, LoadLevel::Balanced);
    }

    #[test]
    fn test_revenue_and_active_counts() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[4])).unwrap();
        let orders = place_n(&db, "4", 2);
        for status in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            update_order_status(&db, &orders[0].id, status).unwrap();
        }
        place_order(&db, new_order("table-x", "sess")).unwrap();

        let report = workload_report(&db, None).unwrap();
        let row = &report.staff[0];
        assert_eq!(row.total_orders, 2);
        assert_eq!(row.active_orders, 1);
        assert_eq!(row.total_revenue, 27.5);
    }

    #[test]
    fn test_report_is_scoped_to_restaurant() {
        let db = test_db();
        let mut ana = waiter("Ana", &[1]);
        ana.restaurant_id = Some("r-1".into());
        create_staff(&db, ana).unwrap();
        let mut ben = waiter("Ben", &[1]);
        ben.restaurant_id = Some("r-2".into());
        create_staff(&db, ben).unwrap();
        for (restaurant, n) in [("r-1", 3), ("r-2", 5)] {
            for _ in 0..n {
                let mut order = new_order("1", "sess");
                order.restaurant_id = Some(restaurant.into());
                place_order(&db, order).unwrap();
            }
        }

        let report = workload_report(&db, Some("r-1")).unwrap();
        assert_eq!(report.staff.len(), 1);
        assert_eq!(report.staff[0].name, "Ana");
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.staff[0].total_orders, 3);
    }

    #[test]
    fn test_apply_rebalance_moves_table_atomically() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[1, 2])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[9, 3])).unwrap();
        let suggestion = RebalanceSuggestion {
            table_number: 2,
            from_staff_id: a.id.clone(),
            to_staff_id: b.id.clone(),
            reason: String::new(),
        };

        let outcome = apply_rebalance(&db, &suggestion).unwrap();
        assert_eq!(outcome.from.assigned_tables, vec![1]);
        assert_eq!(outcome.to.assigned_tables, vec![2, 3, 9]);

        // Second apply of the same suggestion is stale.
        assert!(matches!(
            apply_rebalance(&db, &suggestion),
            Err(EngineError::Conflict(_))
        ));
        let conn = db.lock();
        assert_eq!(load_staff(&conn, &b.id).unwrap().assigned_tables, vec![2, 3, 9]);
    }

    #[test]
    fn test_apply_rebalance_target_already_holds_table() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[1, 2])).unwrap();
        let b = create_staff(&db, waiter("Ben", &[2])).unwrap();
        let suggestion = RebalanceSuggestion {
            table_number: 2,
            from_staff_id: a.id.clone(),
            to_staff_id: b.id.clone(),
            reason: String::new(),
        };
        assert!(matches!(
            apply_rebalance(&db, &suggestion),
            Err(EngineError::Conflict(_))
        ));
        let conn = db.lock();
        assert_eq!(load_staff(&conn, &a.id).unwrap().assigned_tables, vec![1, 2]);
    }

    #[test]
    fn test_apply_rebalance_unknown_staff() {
        let db = test_db();
        let a = create_staff(&db, waiter("Ana", &[1])).unwrap();
        let suggestion = RebalanceSuggestion {
            table_number: 1,
            from_staff_id: a.id.clone(),
            to_staff_id: "ghost".into(),
            reason: String::new(),
        };
        assert!(matches!(
            apply_rebalance(&db, &suggestion),
            Err(EngineError::NotFound { .. })
        ));
        let conn = db.lock();
        assert_eq!(load_staff(&conn, &a.id).unwrap().assigned_tables, vec![1]);
    }
}
