use serde_json::Value;

use super::{parse_payload, parse_scope, to_json};
use crate::db::DbState;
use crate::error::EngineResult;
use crate::workload::{self, RebalanceSuggestion};

pub(super) fn workload_report(db: &DbState, arg: Value) -> EngineResult<Value> {
    let scope = parse_scope(arg)?;
    to_json(&workload::workload_report(db, scope.as_deref())?)
}

/// Takes a suggestion exactly as `workload_report` returned it.
pub(super) fn workload_apply_rebalance(db: &DbState, arg: Value) -> EngineResult<Value> {
    let suggestion: RebalanceSuggestion = parse_payload(arg, "tableNumber", "rebalance")?;
    to_json(&workload::apply_rebalance(db, &suggestion)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::orders::place_order;
    use crate::orders::tests::new_order;
    use crate::staff::create_staff;
    use crate::staff::tests::waiter;
    use serde_json::json;

    #[test]
    fn report_suggestion_applies_once() {
        let db = test_db();
        create_staff(&db, waiter("Ana", &[1, 2])).unwrap();
        create_staff(&db, waiter("Ben", &[3])).unwrap();
        for (table, n) in [("1", 7), ("2", 3), ("3", 2)] {
            for _ in 0..n {
                place_order(&db, new_order(table, "sess")).unwrap();
            }
        }

        let report = workload_report(&db, json!({})).unwrap();
        assert_eq!(report["imbalanced"], true);
        let suggestion = report["suggestions"][0].clone();
        assert_eq!(suggestion["tableNumber"], 2);

        let applied = workload_apply_rebalance(&db, suggestion.clone()).unwrap();
        assert_eq!(applied["from"]["assignedTables"], json!([1]));
        assert_eq!(applied["to"]["assignedTables"], json!([2, 3]));

        let stale = workload_apply_rebalance(&db, suggestion);
        assert!(matches!(stale, Err(crate::error::EngineError::Conflict(_))));
    }
}
