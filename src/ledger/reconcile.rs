//! Read-side projections over lots and warehouse movements.
//!
//! Intake draws units off a purchase line item (and its lot) into the
//! warehouse, egress releases units that were received. Every report derives
//! its figures from here, so all of them agree.
//! Nothing in this module fails: missing data reconciles to zero.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::expiry::{classify_expiry, ExpiryStatus};
use super::movement::MovementType;
use super::quantity::{PackBreakdown, PurchaseQuantity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotRecord {
    pub id: Uuid,
    pub lot_number: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRecord {
    pub id: Uuid,
    pub lot_id: Option<Uuid>,
    pub total_quantity: i32,
    pub movement_type: MovementType,
    pub recorded_at: DateTime<Utc>,
}

/// Units received into the warehouse and released from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Flow {
    pub received: i64,
    pub released: i64,
}

impl Flow {
    pub fn of<'a>(movements: impl IntoIterator<Item = &'a MovementRecord>) -> Self {
        let mut flow = Self::default();
        for movement in movements {
            flow.record(movement);
        }
        flow
    }

    pub fn record(&mut self, movement: &MovementRecord) {
        let quantity = i64::from(movement.total_quantity);
        match movement.movement_type {
            MovementType::Intake => self.received += quantity,
            MovementType::Egress => self.released += quantity,
        }
    }

    pub fn on_hand(&self) -> i64 {
        self.received - self.released
    }
}

/// Flow per lot; movements without a lot are skipped.
pub fn flow_by_lot(movements: &[MovementRecord]) -> HashMap<Uuid, Flow> {
    let mut flows: HashMap<Uuid, Flow> = HashMap::new();
    for movement in movements {
        if let Some(lot_id) = movement.lot_id {
            flows.entry(lot_id).or_default().record(movement);
        }
    }
    flows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotBalance {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_quantity: i64,
    /// Units of this lot received into the warehouse.
    pub used: i64,
    pub released: i64,
    /// Units of this lot still to be received.
    pub remaining: i64,
    pub on_hand: i64,
    pub is_active: bool,
    pub expiry: ExpiryStatus,
}

impl LotBalance {
    /// Units not yet released, whether still to be received or on the shelf.
    pub fn in_stock(&self) -> i64 {
        self.initial_quantity - self.released
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemBalance {
    pub quantity: PurchaseQuantity,
    pub total_purchased: i64,
    /// Units received off this line item.
    pub total_moved: i64,
    pub total_released: i64,
    /// Units still to be received, split into packs by `breakdown`.
    pub remaining: i64,
    pub on_hand: i64,
    pub breakdown: PackBreakdown,
    pub lots: Vec<LotBalance>,
}

impl LineItemBalance {
    /// More was received than purchased, or more released than received.
    /// Only possible for rows written without the movement guard.
    pub fn is_overdrawn(&self) -> bool {
        self.remaining < 0 || self.on_hand < 0
    }

    pub fn lots_with_stock(&self) -> impl Iterator<Item = &LotBalance> {
        self.lots.iter().filter(|lot| lot.in_stock() > 0)
    }
}

pub fn lot_balance(
    lot: &LotRecord,
    flows: &HashMap<Uuid, Flow>,
    now: DateTime<Utc>,
    window_days: i64,
) -> LotBalance {
    let flow = flows.get(&lot.id).copied().unwrap_or_default();
    let initial_quantity = i64::from(lot.initial_quantity);
    LotBalance {
        lot_id: lot.id,
        lot_number: lot.lot_number.clone(),
        expires_at: lot.expires_at,
        initial_quantity,
        used: flow.received,
        released: flow.released,
        remaining: initial_quantity - flow.received,
        on_hand: flow.on_hand(),
        is_active: lot.is_active,
        expiry: classify_expiry(lot.expires_at, now, window_days),
    }
}

pub fn reconcile_line_item(
    quantity: PurchaseQuantity,
    lots: &[LotRecord],
    movements: &[MovementRecord],
    now: DateTime<Utc>,
    window_days: i64,
) -> LineItemBalance {
    let total_purchased = quantity.total();
    let flow = Flow::of(movements);
    let remaining = total_purchased - flow.received;
    let flows = flow_by_lot(movements);

    LineItemBalance {
        quantity,
        total_purchased,
        total_moved: flow.received,
        total_released: flow.released,
        remaining,
        on_hand: flow.on_hand(),
        breakdown: PackBreakdown::for_quantity(remaining, &quantity),
        lots: lots
            .iter()
            .map(|lot| lot_balance(lot, &flows, now, window_days))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExpiryCounts {
    pub near_expiry: usize,
    pub expired: usize,
}

impl ExpiryCounts {
    /// Only lots that still hold stock raise an alert.
    pub fn tally<'a>(lots: impl IntoIterator<Item = &'a LotBalance>) -> Self {
        let mut counts = Self::default();
        for lot in lots.into_iter().filter(|lot| lot.in_stock() > 0) {
            match lot.expiry {
                ExpiryStatus::NearExpiry => counts.near_expiry += 1,
                ExpiryStatus::Expired => counts.expired += 1,
                ExpiryStatus::Normal | ExpiryStatus::NoExpiry => {}
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStockSummary {
    pub total_purchased: i64,
    pub pending_intake: i64,
    pub total_in: i64,
    pub total_out: i64,
    pub current_stock: i64,
    pub reorder_threshold: i64,
    pub below_reorder_point: bool,
    pub shortfall: i64,
    pub near_expiry_lots: usize,
    pub expired_lots: usize,
}

/// `current_stock` is what the warehouse holds: units received minus units released.
pub fn summarize_product(reorder_threshold: i32, balances: &[LineItemBalance]) -> ProductStockSummary {
    let total_purchased: i64 = balances.iter().map(|b| b.total_purchased).sum();
    let total_in: i64 = balances.iter().map(|b| b.total_moved).sum();
    let total_out: i64 = balances.iter().map(|b| b.total_released).sum();
    let current_stock = total_in - total_out;
    let reorder_threshold = i64::from(reorder_threshold);
    let below_reorder_point = current_stock < reorder_threshold;
    let expiry = ExpiryCounts::tally(balances.iter().flat_map(|b| b.lots.iter()));

    ProductStockSummary {
        total_purchased,
        pending_intake: total_purchased - total_in,
        total_in,
        total_out,
        current_stock,
        reorder_threshold,
        below_reorder_point,
        shortfall: if below_reorder_point {
            reorder_threshold - current_stock
        } else {
            0
        },
        near_expiry_lots: expiry.near_expiry,
        expired_lots: expiry.expired,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StockOverview {
    pub total_products: usize,
    pub below_reorder_point: usize,
    pub with_expiry_alerts: usize,
    pub out_of_stock: usize,
    pub near_expiry_lots: usize,
    pub expired_lots: usize,
}

impl StockOverview {
    pub fn from_products<'a>(summaries: impl IntoIterator<Item = &'a ProductStockSummary>) -> Self {
        let mut overview = Self::default();
        for summary in summaries {
            overview.total_products += 1;
            if summary.below_reorder_point {
                overview.below_reorder_point += 1;
            }
            if summary.near_expiry_lots + summary.expired_lots > 0 {
                overview.with_expiry_alerts += 1;
            }
            if summary.current_stock == 0 {
                overview.out_of_stock += 1;
            }
            overview.near_expiry_lots += summary.near_expiry_lots;
            overview.expired_lots += summary.expired_lots;
        }
        overview
    }
}

/// Units received and released through the warehouse ledger, split by type.
pub fn ledger_flow(movements: &[MovementRecord]) -> (i64, i64) {
    let flow = Flow::of(movements);
    (flow.received, flow.released)
}

/// Disagreement between the stored stock counter and what the ledger implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockDrift {
    pub product_id: Uuid,
    pub counter: i64,
    pub ledger_on_hand: i64,
    pub difference: i64,
}

pub fn detect_drift(product_id: Uuid, counter: i32, intake: i64, egress: i64, sold: i64) -> Option<StockDrift> {
    let counter = i64::from(counter);
    let ledger_on_hand = intake - egress - sold;
    (counter != ledger_on_hand).then_some(StockDrift {
        product_id,
        counter,
        ledger_on_hand,
        difference: counter - ledger_on_hand,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::expiry::DEFAULT_NEAR_EXPIRY_DAYS;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    fn lot(number: &str, quantity: i32, expires_at: Option<DateTime<Utc>>) -> LotRecord {
        LotRecord {
            id: Uuid::new_v4(),
            lot_number: number.to_string(),
            expires_at,
            initial_quantity: quantity,
            is_active: true,
            created_at: now(),
        }
    }

    fn movement(lot_id: Option<Uuid>, quantity: i32, movement_type: MovementType) -> MovementRecord {
        MovementRecord {
            id: Uuid::new_v4(),
            lot_id,
            total_quantity: quantity,
            movement_type,
            recorded_at: now(),
        }
    }

    #[test]
    fn lot_remaining_after_two_movements() {
        let l1 = lot("L1", 50, None);
        let movements = vec![
            movement(Some(l1.id), 20, MovementType::Intake),
            movement(Some(l1.id), 15, MovementType::Intake),
        ];
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 50 },
            std::slice::from_ref(&l1),
            &movements,
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );

        assert_eq!(balance.lots[0].used, 35);
        assert_eq!(balance.lots[0].remaining, 15);
        assert_eq!(balance.lots[0].on_hand, 35);
        assert_eq!(balance.remaining, 15);
        assert!(!balance.is_overdrawn());
    }

    #[test]
    fn egress_lowers_on_hand_but_not_what_is_left_to_receive() {
        let l1 = lot("L1", 50, None);
        let movements = vec![
            movement(Some(l1.id), 30, MovementType::Intake),
            movement(Some(l1.id), 12, MovementType::Egress),
        ];
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 50 },
            std::slice::from_ref(&l1),
            &movements,
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );

        assert_eq!(balance.remaining, 20);
        assert_eq!(balance.on_hand, 18);
        assert_eq!(balance.total_released, 12);
        assert_eq!(balance.lots[0].remaining, 20);
        assert_eq!(balance.lots[0].on_hand, 18);
        assert_eq!(balance.lots[0].in_stock(), 38);

        let summary = summarize_product(0, &[balance]);
        assert_eq!(summary.total_in, 30);
        assert_eq!(summary.total_out, 12);
        assert_eq!(summary.current_stock, 18);
        assert_eq!(summary.pending_intake, 20);
    }

    #[test]
    fn undated_lot_never_alerts() {
        let undated = lot("L1", 200, None);
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 200 },
            &[undated],
            &[],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        let summary = summarize_product(0, &[balance.clone()]);

        assert_eq!(balance.lots[0].expiry, ExpiryStatus::NoExpiry);
        assert_eq!(balance.lots[0].remaining, 200);
        assert_eq!(summary.near_expiry_lots, 0);
        assert_eq!(summary.expired_lots, 0);
    }

    #[test]
    fn movements_without_lot_count_toward_line_only() {
        let l1 = lot("L1", 10, None);
        let balance = reconcile_line_item(
            PurchaseQuantity::Bulk { packs: 2, units_per_pack: 5 },
            &[l1],
            &[movement(None, 4, MovementType::Intake)],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(balance.remaining, 6);
        assert_eq!(balance.breakdown, PackBreakdown { packs: 1, units: 1, total: 6 });
        assert_eq!(balance.lots[0].remaining, 10);
    }

    #[test]
    fn overdrawn_ledger_is_reported_not_clamped() {
        let received_too_much = reconcile_line_item(
            PurchaseQuantity::Individual { units: 5 },
            &[],
            &[movement(None, 8, MovementType::Intake)],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(received_too_much.remaining, -3);
        assert!(received_too_much.is_overdrawn());

        let released_unreceived = reconcile_line_item(
            PurchaseQuantity::Individual { units: 5 },
            &[],
            &[movement(None, 2, MovementType::Egress)],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(released_unreceived.on_hand, -2);
        assert!(released_unreceived.is_overdrawn());
    }

    #[test]
    fn product_without_purchases_reports_zero() {
        let summary = summarize_product(0, &[]);
        assert_eq!(summary.current_stock, 0);
        assert_eq!(summary.pending_intake, 0);
        assert!(!summary.below_reorder_point);
        assert_eq!(summary.near_expiry_lots, 0);
    }

    #[test]
    fn reorder_alert_and_shortfall() {
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 12 },
            &[],
            &[
                movement(None, 12, MovementType::Intake),
                movement(None, 5, MovementType::Egress),
            ],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        let summary = summarize_product(10, &[balance]);
        assert_eq!(summary.current_stock, 7);
        assert!(summary.below_reorder_point);
        assert_eq!(summary.shortfall, 3);
    }

    #[test]
    fn overview_counts_buckets_across_products() {
        let soon = lot("S", 10, Some(now() + Duration::days(5)));
        let gone = lot("G", 10, Some(now() - Duration::days(2)));
        let later = lot("N", 10, Some(now() + Duration::days(90)));
        let a = reconcile_line_item(
            PurchaseQuantity::Individual { units: 20 },
            &[soon.clone(), gone.clone()],
            &[
                movement(Some(soon.id), 10, MovementType::Intake),
                movement(Some(gone.id), 10, MovementType::Intake),
            ],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        let b = reconcile_line_item(
            PurchaseQuantity::Individual { units: 10 },
            &[later.clone()],
            &[
                movement(Some(later.id), 10, MovementType::Intake),
                movement(Some(later.id), 10, MovementType::Egress),
            ],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        let summaries = vec![summarize_product(0, &[a]), summarize_product(5, &[b])];
        let overview = StockOverview::from_products(&summaries);

        assert_eq!(overview.total_products, 2);
        assert_eq!(overview.near_expiry_lots, 1);
        assert_eq!(overview.expired_lots, 1);
        assert_eq!(overview.with_expiry_alerts, 1);
        assert_eq!(overview.out_of_stock, 1);
        assert_eq!(overview.below_reorder_point, 1);
    }

    #[test]
    fn released_lots_do_not_raise_expiry_alerts() {
        let gone = lot("G", 10, Some(now() - Duration::days(2)));
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 10 },
            std::slice::from_ref(&gone),
            &[
                movement(Some(gone.id), 10, MovementType::Intake),
                movement(Some(gone.id), 10, MovementType::Egress),
            ],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(ExpiryCounts::tally(&balance.lots), ExpiryCounts::default());
        assert_eq!(balance.lots_with_stock().count(), 0);
    }

    #[test]
    fn received_lots_on_the_shelf_still_alert() {
        let gone = lot("G", 10, Some(now() - Duration::days(2)));
        let balance = reconcile_line_item(
            PurchaseQuantity::Individual { units: 10 },
            std::slice::from_ref(&gone),
            &[movement(Some(gone.id), 10, MovementType::Intake)],
            now(),
            DEFAULT_NEAR_EXPIRY_DAYS,
        );
        assert_eq!(ExpiryCounts::tally(&balance.lots).expired, 1);
    }

    #[test]
    fn drift_between_counter_and_ledger() {
        let product = Uuid::new_v4();
        assert_eq!(detect_drift(product, 40, 50, 0, 10), None);
        let drift = detect_drift(product, 45, 50, 0, 10).unwrap();
        assert_eq!(drift.difference, 5);
        assert_eq!(drift.ledger_on_hand, 40);
    }

    #[test]
    fn ledger_flow_splits_by_type() {
        let movements = vec![
            movement(None, 30, MovementType::Intake),
            movement(None, 4, MovementType::Egress),
            movement(None, 6, MovementType::Intake),
        ];
        assert_eq!(ledger_flow(&movements), (36, 4));
    }

    proptest! {
        #[test]
        fn reconciliation_is_idempotent(moves in prop::collection::vec(1i32..40, 0..12)) {
            let l1 = lot("L1", 400, Some(now() + Duration::days(12)));
            let movements: Vec<MovementRecord> = moves
                .iter()
                .map(|q| movement(Some(l1.id), *q, MovementType::Intake))
                .collect();
            let lots = vec![l1];
            let quantity = PurchaseQuantity::Individual { units: 400 };

            let first = reconcile_line_item(quantity, &lots, &movements, now(), DEFAULT_NEAR_EXPIRY_DAYS);
            let second = reconcile_line_item(quantity, &lots, &movements, now(), DEFAULT_NEAR_EXPIRY_DAYS);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.remaining, 400 - moves.iter().map(|q| i64::from(*q)).sum::<i64>());
        }
    }
}
