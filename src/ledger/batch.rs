//! Lot planning for a purchase line item.
//!
//! A purchased quantity is split into named lots before anything is written.
//! The plan is all-or-nothing: either every lot is valid and the quantities
//! add up to the purchase, or the whole line item is rejected.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::error::{LedgerError, LedgerResult};
use super::expiry::{parse_expiry, ExpiryDatePolicy};

/// A lot as supplied by the purchase form.
#[derive(Debug, Clone, Deserialize)]
pub struct LotEntry {
    pub lot_number: String,
    #[serde(default)]
    pub expires_on: Option<String>,
    pub quantity: i32,
}

/// A validated lot ready to be inserted, always active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLot {
    pub lot_number: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_quantity: i32,
}

pub fn plan_lots<S: AsRef<str>>(
    product_id: Uuid,
    total_purchased: i64,
    entries: &[LotEntry],
    existing_lot_numbers: &[S],
    expiry_policy: ExpiryDatePolicy,
) -> LedgerResult<Vec<PlannedLot>> {
    if entries.is_empty() {
        return Err(LedgerError::validation(format!(
            "at least one lot is required for product {}",
            product_id
        )));
    }

    let mut allocated: i64 = 0;
    for entry in entries {
        if entry.lot_number.trim().is_empty() {
            return Err(LedgerError::validation(format!(
                "lot number cannot be blank for product {}",
                product_id
            )));
        }
        if entry.quantity <= 0 {
            return Err(LedgerError::validation(format!(
                "lot {} must hold a positive quantity for product {}",
                entry.lot_number.trim(),
                product_id
            )));
        }
        allocated += i64::from(entry.quantity);
    }

    if allocated != total_purchased {
        return Err(LedgerError::validation(format!(
            "lot quantities ({}) must add up to the purchased quantity ({}) of product {}",
            allocated, total_purchased, product_id
        )));
    }

    let existing: HashSet<&str> = existing_lot_numbers.iter().map(|n| n.as_ref().trim()).collect();
    let mut seen = HashSet::new();
    let mut duplicated = Vec::new();
    for entry in entries {
        let number = entry.lot_number.trim();
        if (existing.contains(number) || !seen.insert(number)) && !duplicated.iter().any(|d| d == number) {
            duplicated.push(number.to_string());
        }
    }
    if !duplicated.is_empty() {
        return Err(LedgerError::Conflict {
            product_id,
            lot_numbers: duplicated,
        });
    }

    entries
        .iter()
        .map(|entry| {
            Ok(PlannedLot {
                lot_number: entry.lot_number.trim().to_string(),
                expires_at: parse_expiry(entry.expires_on.as_deref(), expiry_policy)?,
                initial_quantity: entry.quantity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::quantity::PurchaseQuantity;
    use proptest::prelude::*;

    fn lot(number: &str, quantity: i32) -> LotEntry {
        LotEntry {
            lot_number: number.to_string(),
            expires_on: None,
            quantity,
        }
    }

    const NO_LOTS: &[&str] = &[];

    #[test]
    fn bulk_purchase_split_into_two_lots() {
        let product = Uuid::new_v4();
        let total = PurchaseQuantity::from_columns(10, 10, 0).total();
        let planned = plan_lots(
            product,
            total,
            &[lot("L1", 60), lot("L2", 40)],
            NO_LOTS,
            ExpiryDatePolicy::Lenient,
        )
        .unwrap();

        assert_eq!(total, 100);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].lot_number, "L1");
        assert_eq!(planned[1].initial_quantity, 40);
    }

    #[test]
    fn short_allocation_is_rejected() {
        let product = Uuid::new_v4();
        let err = plan_lots(
            product,
            100,
            &[lot("L1", 60), lot("L2", 30)],
            NO_LOTS,
            ExpiryDatePolicy::Lenient,
        )
        .unwrap_err();

        match err {
            LedgerError::Validation(msg) => assert!(msg.contains(&product.to_string())),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn excess_allocation_is_rejected() {
        let err = plan_lots(
            Uuid::new_v4(),
            100,
            &[lot("L1", 60), lot("L2", 50)],
            NO_LOTS,
            ExpiryDatePolicy::Lenient,
        );
        assert!(matches!(err, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn empty_lot_list_is_rejected() {
        let err = plan_lots(Uuid::new_v4(), 10, &[], NO_LOTS, ExpiryDatePolicy::Lenient);
        assert!(matches!(err, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn existing_lot_number_conflicts() {
        let product = Uuid::new_v4();
        let err = plan_lots(
            product,
            10,
            &[lot("A1", 10)],
            &["A1".to_string(), "Z9".to_string()],
            ExpiryDatePolicy::Lenient,
        )
        .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Conflict {
                product_id: product,
                lot_numbers: vec!["A1".to_string()],
            }
        );
        assert!(err.to_string().contains("A1"));
    }

    #[test]
    fn repeated_lot_number_in_request_conflicts() {
        let err = plan_lots(
            Uuid::new_v4(),
            10,
            &[lot("A1", 5), lot(" A1 ", 5)],
            NO_LOTS,
            ExpiryDatePolicy::Lenient,
        );
        assert!(matches!(err, Err(LedgerError::Conflict { lot_numbers, .. }) if lot_numbers == vec!["A1"]));
    }

    #[test]
    fn blank_and_zero_lots_are_rejected() {
        assert!(plan_lots(Uuid::new_v4(), 5, &[lot(" ", 5)], NO_LOTS, ExpiryDatePolicy::Lenient).is_err());
        assert!(plan_lots(
            Uuid::new_v4(),
            5,
            &[lot("A", 5), lot("B", 0)],
            NO_LOTS,
            ExpiryDatePolicy::Lenient
        )
        .is_err());
    }

    #[test]
    fn unusable_expiry_dates_depend_on_policy() {
        let entries = vec![LotEntry {
            lot_number: "L1".to_string(),
            expires_on: Some("1970-01-01T00:00:00Z".to_string()),
            quantity: 5,
        }];

        let lenient = plan_lots(Uuid::new_v4(), 5, &entries, NO_LOTS, ExpiryDatePolicy::Lenient).unwrap();
        assert_eq!(lenient[0].expires_at, None);

        let strict = plan_lots(Uuid::new_v4(), 5, &entries, NO_LOTS, ExpiryDatePolicy::Strict);
        assert!(matches!(strict, Err(LedgerError::Validation(_))));
    }

    proptest! {
        #[test]
        fn accepted_plans_always_sum_to_purchase(quantities in prop::collection::vec(1i32..500, 1..8)) {
            let total: i64 = quantities.iter().map(|q| i64::from(*q)).sum();
            let entries: Vec<LotEntry> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| lot(&format!("L{}", i), *q))
                .collect();

            let planned = plan_lots(Uuid::new_v4(), total, &entries, NO_LOTS, ExpiryDatePolicy::Lenient).unwrap();
            let planned_total: i64 = planned.iter().map(|l| i64::from(l.initial_quantity)).sum();
            prop_assert_eq!(planned_total, total);

            let off_by_one = plan_lots(Uuid::new_v4(), total + 1, &entries, NO_LOTS, ExpiryDatePolicy::Lenient);
            prop_assert!(off_by_one.is_err());
        }
    }
}
