use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{LedgerError, LedgerResult};
use super::quantity::PurchaseQuantity;
use super::reconcile::{flow_by_lot, Flow, LotRecord, MovementRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Intake,
    Egress,
}

impl MovementType {
    pub fn code(&self) -> i16 {
        match self {
            MovementType::Intake => 1,
            MovementType::Egress => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(MovementType::Intake),
            2 => Some(MovementType::Egress),
            _ => None,
        }
    }

    /// Sign applied to the product's stock counter.
    pub fn stock_sign(&self) -> i32 {
        match self {
            MovementType::Intake => 1,
            MovementType::Egress => -1,
        }
    }
}

/// Which lot a movement draws from when the caller does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSelectionPolicy {
    /// First lot in creation order that still holds stock.
    #[default]
    CreatedOrder,
    /// Soonest-expiring lot with stock; undated lots come last.
    NearestExpiry,
    /// The caller must name the lot.
    Explicit,
}

impl FromStr for LotSelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_order" | "created" | "fifo" => Ok(Self::CreatedOrder),
            "nearest_expiry" | "fefo" => Ok(Self::NearestExpiry),
            "explicit" => Ok(Self::Explicit),
            other => Err(format!("unknown lot selection policy: {}", other)),
        }
    }
}

/// Units moved in a single warehouse movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementQuantity {
    pub packs: i32,
    pub units: i32,
    pub total: i64,
}

impl MovementQuantity {
    pub fn resolve(packs: i32, units: i32, purchase: &PurchaseQuantity) -> LedgerResult<Self> {
        if packs < 0 || units < 0 {
            return Err(LedgerError::validation("movement quantities cannot be negative"));
        }
        if packs > 0 && !purchase.is_bulk() {
            return Err(LedgerError::validation(
                "packs can only be moved for line items purchased in bulk",
            ));
        }
        let total = i64::from(packs) * purchase.pack_size() + i64::from(units);
        if total == 0 {
            return Err(LedgerError::validation("movement quantity must be positive"));
        }
        Ok(Self { packs, units, total })
    }
}

/// Explicit unit wins, then the line item's bulk unit when packs move, then the default.
pub fn resolve_unit_of_measure(
    explicit: Option<i32>,
    packs: i32,
    bulk_unit_of_measure_id: Option<i32>,
    default_unit_of_measure_id: i32,
) -> i32 {
    explicit.unwrap_or_else(|| {
        if packs > 0 {
            bulk_unit_of_measure_id.unwrap_or(default_unit_of_measure_id)
        } else {
            default_unit_of_measure_id
        }
    })
}

/// Units a movement of this type may still take from a lot: intake is bounded by
/// what the lot has left to receive, egress by what was received and not released.
fn lot_capacity(lot: &LotRecord, flow: Flow, movement_type: MovementType) -> i64 {
    match movement_type {
        MovementType::Intake => i64::from(lot.initial_quantity) - flow.received,
        MovementType::Egress => flow.on_hand(),
    }
}

fn line_capacity(purchase: &PurchaseQuantity, movements: &[MovementRecord], movement_type: MovementType) -> i64 {
    let flow = Flow::of(movements);
    match movement_type {
        MovementType::Intake => purchase.total() - flow.received,
        MovementType::Egress => flow.on_hand(),
    }
}

/// Lots in the order automatic selection draws from them. Active lots always
/// come before inactive ones; the sorts are stable so ties keep creation order.
fn draw_order(lots: &[LotRecord], policy: LotSelectionPolicy) -> Vec<&LotRecord> {
    let mut order: Vec<&LotRecord> = lots.iter().collect();
    match policy {
        LotSelectionPolicy::NearestExpiry => {
            order.sort_by_key(|lot| (!lot.is_active, lot.expires_at.is_none(), lot.expires_at))
        }
        LotSelectionPolicy::CreatedOrder | LotSelectionPolicy::Explicit => order.sort_by_key(|lot| !lot.is_active),
    }
    order
}

/// Picks the lot a movement is booked against.
///
/// `lots` must be in creation order. Automatic selection takes the first lot in
/// draw order that can still give to this kind of movement, or the first lot in
/// draw order when none can. Returns `None` only when the line item has no lots.
pub fn select_lot(
    lots: &[LotRecord],
    movements: &[MovementRecord],
    movement_type: MovementType,
    requested: Option<Uuid>,
    policy: LotSelectionPolicy,
) -> LedgerResult<Option<Uuid>> {
    if let Some(lot_id) = requested {
        return lots
            .iter()
            .find(|lot| lot.id == lot_id)
            .map(|lot| Some(lot.id))
            .ok_or_else(|| LedgerError::not_found(format!("lot {}", lot_id)));
    }

    if policy == LotSelectionPolicy::Explicit && !lots.is_empty() {
        return Err(LedgerError::validation("a lot must be specified for this movement"));
    }

    let order = draw_order(lots, policy);
    let Some(first) = order.first().copied() else {
        return Ok(None);
    };

    let flows = flow_by_lot(movements);
    let chosen = order.iter().copied().find(|lot| {
        lot_capacity(lot, flows.get(&lot.id).copied().unwrap_or_default(), movement_type) > 0
    });

    Ok(Some(chosen.unwrap_or(first).id))
}

/// Rejects a movement that would receive more than was purchased, or release
/// more than was received, on the line item or on its lot.
pub fn ensure_available(
    quantity: i64,
    movement_type: MovementType,
    purchase: &PurchaseQuantity,
    lots: &[LotRecord],
    movements: &[MovementRecord],
    lot_id: Option<Uuid>,
) -> LedgerResult<()> {
    let line_available = line_capacity(purchase, movements, movement_type);
    if quantity > line_available {
        return Err(LedgerError::InsufficientStock {
            requested: quantity,
            available: line_available.max(0),
        });
    }

    if let Some(lot) = lot_id.and_then(|id| lots.iter().find(|lot| lot.id == id)) {
        let flow = flow_by_lot(movements).get(&lot.id).copied().unwrap_or_default();
        let lot_available = lot_capacity(lot, flow, movement_type);
        if quantity > lot_available {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available: lot_available.max(0),
            });
        }
    }

    Ok(())
}

/// The share of a movement booked against one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub lot_id: Option<Uuid>,
    pub quantity: i64,
}

/// Splits a movement across the line item's lots.
///
/// A named lot, or a line item without lots, takes the whole quantity. Otherwise
/// lots are drawn in `draw_order`, each up to what it can still give, and the
/// movement is refused when they cannot cover it together.
pub fn allocate_movement(
    quantity: i64,
    movement_type: MovementType,
    purchase: &PurchaseQuantity,
    lots: &[LotRecord],
    movements: &[MovementRecord],
    requested: Option<Uuid>,
    policy: LotSelectionPolicy,
) -> LedgerResult<Vec<Allocation>> {
    if requested.is_some() || lots.is_empty() {
        let lot_id = select_lot(lots, movements, movement_type, requested, policy)?;
        ensure_available(quantity, movement_type, purchase, lots, movements, lot_id)?;
        return Ok(vec![Allocation { lot_id, quantity }]);
    }

    if policy == LotSelectionPolicy::Explicit {
        return Err(LedgerError::validation("a lot must be specified for this movement"));
    }

    ensure_available(quantity, movement_type, purchase, lots, movements, None)?;

    let flows = flow_by_lot(movements);
    let mut left = quantity;
    let mut allocations = Vec::new();
    for lot in draw_order(lots, policy) {
        if left == 0 {
            break;
        }
        let available = lot_capacity(lot, flows.get(&lot.id).copied().unwrap_or_default(), movement_type);
        if available <= 0 {
            continue;
        }
        let share = available.min(left);
        allocations.push(Allocation {
            lot_id: Some(lot.id),
            quantity: share,
        });
        left -= share;
    }

    if left > 0 {
        return Err(LedgerError::InsufficientStock {
            requested: quantity,
            available: quantity - left,
        });
    }

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
    }

    fn lot(number: &str, quantity: i32, expires_in_days: Option<i64>, order: i64) -> LotRecord {
        LotRecord {
            id: Uuid::new_v4(),
            lot_number: number.to_string(),
            expires_at: expires_in_days.map(|d| now() + Duration::days(d)),
            initial_quantity: quantity,
            is_active: true,
            created_at: now() + Duration::seconds(order),
        }
    }

    fn booked(lot_id: Option<Uuid>, quantity: i64, movement_type: MovementType) -> MovementRecord {
        MovementRecord {
            id: Uuid::new_v4(),
            lot_id,
            total_quantity: i32::try_from(quantity).unwrap(),
            movement_type,
            recorded_at: now(),
        }
    }

    fn received(lot_id: Uuid, quantity: i64) -> MovementRecord {
        booked(Some(lot_id), quantity, MovementType::Intake)
    }

    fn released(lot_id: Uuid, quantity: i64) -> MovementRecord {
        booked(Some(lot_id), quantity, MovementType::Egress)
    }

    #[rstest]
    #[case("created_order", LotSelectionPolicy::CreatedOrder)]
    #[case("FEFO", LotSelectionPolicy::NearestExpiry)]
    #[case("nearest_expiry", LotSelectionPolicy::NearestExpiry)]
    #[case(" explicit ", LotSelectionPolicy::Explicit)]
    fn parses_policy_names(#[case] raw: &str, #[case] expected: LotSelectionPolicy) {
        assert_eq!(raw.parse::<LotSelectionPolicy>().unwrap(), expected);
    }

    #[test]
    fn movement_type_codes_round_trip() {
        assert_eq!(MovementType::from_code(MovementType::Intake.code()), Some(MovementType::Intake));
        assert_eq!(MovementType::from_code(2), Some(MovementType::Egress));
        assert_eq!(MovementType::from_code(7), None);
    }

    #[test]
    fn created_order_takes_first_lot_on_fresh_line() {
        let lots = vec![lot("B", 10, Some(40), 0), lot("A", 10, Some(5), 1)];
        let chosen = select_lot(&lots, &[], MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[0].id));
    }

    #[test]
    fn created_order_skips_fully_received_lots() {
        let lots = vec![lot("B", 10, None, 0), lot("A", 10, None, 1)];
        let movements = vec![received(lots[0].id, 10)];
        let chosen = select_lot(&lots, &movements, MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[1].id));
    }

    #[test]
    fn egress_selection_looks_at_what_is_on_hand() {
        let lots = vec![lot("B", 10, None, 0), lot("A", 10, None, 1)];
        let movements = vec![received(lots[1].id, 4)];
        let chosen = select_lot(&lots, &movements, MovementType::Egress, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[1].id));
    }

    #[test]
    fn created_order_falls_back_to_first_when_all_depleted() {
        let lots = vec![lot("B", 5, None, 0), lot("A", 5, None, 1)];
        let movements = vec![received(lots[0].id, 5), received(lots[1].id, 5)];
        let chosen = select_lot(&lots, &movements, MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[0].id));
    }

    #[test]
    fn inactive_lots_are_skipped_unless_all_are_inactive() {
        let mut lots = vec![lot("old", 10, None, 0), lot("new", 10, None, 1)];
        lots[0].is_active = false;
        let chosen = select_lot(&lots, &[], MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[1].id));

        lots[1].is_active = false;
        let chosen = select_lot(&lots, &[], MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap();
        assert_eq!(chosen, Some(lots[0].id));
    }

    #[test]
    fn nearest_expiry_prefers_soonest_dated_lot() {
        let lots = vec![
            lot("undated", 10, None, 0),
            lot("late", 10, Some(60), 1),
            lot("soon", 10, Some(3), 2),
        ];
        let chosen = select_lot(&lots, &[], MovementType::Intake, None, LotSelectionPolicy::NearestExpiry).unwrap();
        assert_eq!(chosen, Some(lots[2].id));
    }

    #[test]
    fn explicit_policy_requires_lot() {
        let lots = vec![lot("A", 10, None, 0)];
        assert!(matches!(
            select_lot(&lots, &[], MovementType::Intake, None, LotSelectionPolicy::Explicit),
            Err(LedgerError::Validation(_))
        ));
        let named = select_lot(&lots, &[], MovementType::Intake, Some(lots[0].id), LotSelectionPolicy::Explicit).unwrap();
        assert_eq!(named, Some(lots[0].id));
    }

    #[test]
    fn foreign_lot_is_not_found() {
        let lots = vec![lot("A", 10, None, 0)];
        let err = select_lot(&lots, &[], MovementType::Egress, Some(Uuid::new_v4()), LotSelectionPolicy::CreatedOrder);
        assert!(matches!(err, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn line_without_lots_moves_without_lot() {
        assert_eq!(
            select_lot(&[], &[], MovementType::Intake, None, LotSelectionPolicy::CreatedOrder).unwrap(),
            None
        );
    }

    #[test]
    fn movement_quantity_uses_pack_size() {
        let bulk = PurchaseQuantity::Bulk { packs: 5, units_per_pack: 12 };
        assert_eq!(MovementQuantity::resolve(2, 3, &bulk).unwrap().total, 27);

        let loose = PurchaseQuantity::Individual { units: 40 };
        assert!(MovementQuantity::resolve(1, 0, &loose).is_err());
        assert!(MovementQuantity::resolve(0, 0, &loose).is_err());
        assert_eq!(MovementQuantity::resolve(0, 9, &loose).unwrap().total, 9);
    }

    #[test]
    fn unit_of_measure_fallbacks() {
        assert_eq!(resolve_unit_of_measure(Some(4), 2, Some(1), 2), 4);
        assert_eq!(resolve_unit_of_measure(None, 2, Some(1), 2), 1);
        assert_eq!(resolve_unit_of_measure(None, 2, None, 2), 2);
        assert_eq!(resolve_unit_of_measure(None, 0, Some(1), 2), 2);
    }

    #[test]
    fn guard_rejects_receiving_more_than_the_lot_holds() {
        let purchase = PurchaseQuantity::Individual { units: 100 };
        let lots = vec![lot("L1", 50, None, 0), lot("L2", 50, None, 1)];
        let movements = vec![received(lots[0].id, 20), received(lots[0].id, 15)];
        let l1 = Some(lots[0].id);

        assert!(ensure_available(15, MovementType::Intake, &purchase, &lots, &movements, l1).is_ok());
        assert_eq!(
            ensure_available(16, MovementType::Intake, &purchase, &lots, &movements, l1),
            Err(LedgerError::InsufficientStock { requested: 16, available: 15 })
        );
    }

    #[test]
    fn guard_rejects_receiving_more_than_the_line_purchased() {
        let purchase = PurchaseQuantity::Individual { units: 10 };
        let movements = vec![booked(None, 8, MovementType::Intake)];
        assert_eq!(
            ensure_available(3, MovementType::Intake, &purchase, &[], &movements, None),
            Err(LedgerError::InsufficientStock { requested: 3, available: 2 })
        );
    }

    #[test]
    fn egress_after_full_intake_is_allowed() {
        let purchase = PurchaseQuantity::Individual { units: 50 };
        let lots = vec![lot("L1", 50, None, 0)];
        let l1 = Some(lots[0].id);
        let mut movements = vec![received(lots[0].id, 50)];

        assert!(ensure_available(5, MovementType::Egress, &purchase, &lots, &movements, l1).is_ok());
        assert_eq!(
            ensure_available(1, MovementType::Intake, &purchase, &lots, &movements, l1),
            Err(LedgerError::InsufficientStock { requested: 1, available: 0 })
        );

        movements.push(released(lots[0].id, 5));
        assert_eq!(
            ensure_available(46, MovementType::Egress, &purchase, &lots, &movements, l1),
            Err(LedgerError::InsufficientStock { requested: 46, available: 45 })
        );
    }

    #[test]
    fn egress_does_not_shrink_what_is_left_to_receive() {
        let purchase = PurchaseQuantity::Individual { units: 50 };
        let lots = vec![lot("L1", 50, None, 0)];
        let l1 = Some(lots[0].id);
        let movements = vec![received(lots[0].id, 20), released(lots[0].id, 20)];

        assert!(ensure_available(30, MovementType::Intake, &purchase, &lots, &movements, l1).is_ok());
        assert_eq!(
            ensure_available(1, MovementType::Egress, &purchase, &lots, &movements, l1),
            Err(LedgerError::InsufficientStock { requested: 1, available: 0 })
        );
    }

    #[test]
    fn nothing_can_leave_before_it_arrives() {
        let purchase = PurchaseQuantity::Individual { units: 10 };
        assert_eq!(
            ensure_available(1, MovementType::Egress, &purchase, &[], &[], None),
            Err(LedgerError::InsufficientStock { requested: 1, available: 0 })
        );
    }

    #[test]
    fn full_intake_spreads_over_lots_in_creation_order() {
        let purchase = PurchaseQuantity::Bulk { packs: 10, units_per_pack: 10 };
        let lots = vec![lot("L1", 60, None, 0), lot("L2", 40, None, 1)];

        let shares = allocate_movement(100, MovementType::Intake, &purchase, &lots, &[], None, LotSelectionPolicy::CreatedOrder)
            .unwrap();
        assert_eq!(
            shares,
            vec![
                Allocation { lot_id: Some(lots[0].id), quantity: 60 },
                Allocation { lot_id: Some(lots[1].id), quantity: 40 },
            ]
        );
    }

    #[test]
    fn partial_intake_continues_where_the_last_one_stopped() {
        let purchase = PurchaseQuantity::Bulk { packs: 10, units_per_pack: 10 };
        let lots = vec![lot("L1", 60, None, 0), lot("L2", 40, None, 1)];
        let movements = vec![received(lots[0].id, 50)];

        let shares = allocate_movement(30, MovementType::Intake, &purchase, &lots, &movements, None, LotSelectionPolicy::CreatedOrder)
            .unwrap();
        assert_eq!(
            shares,
            vec![
                Allocation { lot_id: Some(lots[0].id), quantity: 10 },
                Allocation { lot_id: Some(lots[1].id), quantity: 20 },
            ]
        );
    }

    #[test]
    fn egress_spreads_soonest_expiry_first() {
        let purchase = PurchaseQuantity::Individual { units: 30 };
        let lots = vec![lot("late", 10, Some(90), 0), lot("soon", 10, Some(4), 1), lot("undated", 10, None, 2)];
        let movements: Vec<MovementRecord> = lots.iter().map(|l| received(l.id, 10)).collect();

        let shares = allocate_movement(15, MovementType::Egress, &purchase, &lots, &movements, None, LotSelectionPolicy::NearestExpiry)
            .unwrap();
        assert_eq!(
            shares,
            vec![
                Allocation { lot_id: Some(lots[1].id), quantity: 10 },
                Allocation { lot_id: Some(lots[0].id), quantity: 5 },
            ]
        );
    }

    #[test]
    fn named_lot_takes_the_whole_movement() {
        let purchase = PurchaseQuantity::Bulk { packs: 10, units_per_pack: 10 };
        let lots = vec![lot("L1", 60, None, 0), lot("L2", 40, None, 1)];

        let shares = allocate_movement(40, MovementType::Intake, &purchase, &lots, &[], Some(lots[1].id), LotSelectionPolicy::CreatedOrder)
            .unwrap();
        assert_eq!(shares, vec![Allocation { lot_id: Some(lots[1].id), quantity: 40 }]);

        assert_eq!(
            allocate_movement(100, MovementType::Intake, &purchase, &lots, &[], Some(lots[0].id), LotSelectionPolicy::CreatedOrder),
            Err(LedgerError::InsufficientStock { requested: 100, available: 60 })
        );
    }

    #[test]
    fn allocation_beyond_the_line_is_refused() {
        let purchase = PurchaseQuantity::Individual { units: 20 };
        let lots = vec![lot("L1", 12, None, 0), lot("L2", 8, None, 1)];
        assert_eq!(
            allocate_movement(21, MovementType::Intake, &purchase, &lots, &[], None, LotSelectionPolicy::CreatedOrder),
            Err(LedgerError::InsufficientStock { requested: 21, available: 20 })
        );
    }

    #[test]
    fn allocation_without_lots_books_a_single_share() {
        let purchase = PurchaseQuantity::Individual { units: 20 };
        let shares = allocate_movement(7, MovementType::Intake, &purchase, &[], &[], None, LotSelectionPolicy::Explicit).unwrap();
        assert_eq!(shares, vec![Allocation { lot_id: None, quantity: 7 }]);
    }

    fn direction(is_intake: bool) -> MovementType {
        if is_intake {
            MovementType::Intake
        } else {
            MovementType::Egress
        }
    }

    proptest! {
        #[test]
        fn allocated_movements_never_overdraw(requests in prop::collection::vec((any::<bool>(), 1i64..45), 1..25)) {
            let purchase = PurchaseQuantity::Individual { units: 100 };
            let lots = vec![lot("L1", 60, None, 0), lot("L2", 40, None, 1)];
            let mut movements = Vec::new();

            for (is_intake, quantity) in requests {
                let movement_type = direction(is_intake);
                let allocated = allocate_movement(
                    quantity,
                    movement_type,
                    &purchase,
                    &lots,
                    &movements,
                    None,
                    LotSelectionPolicy::CreatedOrder,
                );
                if let Ok(shares) = allocated {
                    prop_assert_eq!(shares.iter().map(|s| s.quantity).sum::<i64>(), quantity);
                    for share in shares {
                        movements.push(booked(share.lot_id, share.quantity, movement_type));
                    }
                }
            }

            let line = Flow::of(&movements);
            prop_assert!(line.received <= purchase.total());
            prop_assert!(line.on_hand() >= 0);
            let flows = flow_by_lot(&movements);
            for lot in &lots {
                let flow = flows.get(&lot.id).copied().unwrap_or_default();
                prop_assert!(flow.received <= i64::from(lot.initial_quantity));
                prop_assert!(flow.on_hand() >= 0);
            }
        }
    }
}
