//! Warehouse workflows. Every write locks the purchase line item first, so
//! the availability check and the insert see the same ledger.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppResult,
    ledger::{
        allocate_movement, flow_by_lot, lot_balance, resolve_unit_of_measure, Allocation, LedgerError,
        LedgerSettings, LotBalance, LotRecord, MovementQuantity, MovementRecord, MovementType, PackBreakdown,
        PurchaseQuantity,
    },
    models::{IntakeRecord, Lot, MovementPayload, ReceivePayload, WarehouseMovement, LINE_RECEIVED},
    services::stock::{adjust_stock, lock_line_ledger, LineLedger},
};

/// What a single booking asks for, before lots and unit are resolved.
#[derive(Debug, Clone, Copy)]
pub struct MovementRequest {
    pub packs: i32,
    pub units: i32,
    pub movement_type: MovementType,
    pub unit_of_measure_id: Option<i32>,
    pub lot_id: Option<Uuid>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<&MovementPayload> for MovementRequest {
    fn from(payload: &MovementPayload) -> Self {
        Self {
            packs: payload.packs,
            units: payload.units,
            movement_type: payload.movement_type,
            unit_of_measure_id: payload.unit_of_measure_id,
            lot_id: payload.lot_id,
            recorded_at: payload.recorded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntakeReceipt {
    pub intake: IntakeRecord,
    pub movements: Vec<WarehouseMovement>,
    pub current_stock: i32,
    pub line_received: bool,
    pub barcodes_registered: usize,
}

#[derive(Debug, Serialize)]
pub struct MovementReceipt {
    pub movements: Vec<WarehouseMovement>,
    pub current_stock: i32,
}

/// A barcode scanned at intake: the units it stands for and the lot they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeUnit<'a> {
    pub barcode: &'a str,
    pub quantity: i64,
    pub lot_id: Option<Uuid>,
}

/// Packs and loose units recorded on one share of a movement. A movement that
/// stays on a single lot keeps the counts it was entered with.
fn share_counts(
    entered: &MovementQuantity,
    share: i64,
    purchase: &PurchaseQuantity,
) -> Result<(i32, i32), LedgerError> {
    if share == entered.total {
        return Ok((entered.packs, entered.units));
    }
    let split = PackBreakdown::for_quantity(share, purchase);
    let packs = i32::try_from(split.packs)
        .map_err(|_| LedgerError::validation("movement quantity is out of range"))?;
    let units = i32::try_from(split.units)
        .map_err(|_| LedgerError::validation("movement quantity is out of range"))?;
    Ok((packs, units))
}

/// One barcode per pack entered, then one per loose unit. A pack barcode stands
/// for a whole pack. Each barcode is filed under the lot that holds its first unit.
pub fn plan_barcode_units<'a>(
    barcodes: &[&'a str],
    entered: &MovementQuantity,
    pack_size: i64,
    shares: &[Allocation],
) -> Result<Vec<BarcodeUnit<'a>>, LedgerError> {
    if barcodes.is_empty() {
        return Ok(Vec::new());
    }

    let expected = usize::try_from(entered.packs).unwrap_or(0) + usize::try_from(entered.units).unwrap_or(0);
    if barcodes.len() != expected {
        return Err(LedgerError::validation(format!(
            "expected {} barcode(s), one per pack or unit received, got {}",
            expected,
            barcodes.len()
        )));
    }

    let packs = usize::try_from(entered.packs).unwrap_or(0);
    let mut offset = 0;
    Ok(barcodes
        .iter()
        .enumerate()
        .map(|(position, barcode)| {
            let quantity = if position < packs { pack_size } else { 1 };
            let lot_id = lot_at(shares, offset);
            offset += quantity;
            BarcodeUnit {
                barcode: *barcode,
                quantity,
                lot_id,
            }
        })
        .collect())
}

fn lot_at(shares: &[Allocation], offset: i64) -> Option<Uuid> {
    let mut end = 0;
    for share in shares {
        end += share.quantity;
        if offset < end {
            return share.lot_id;
        }
    }
    shares.last().and_then(|share| share.lot_id)
}

/// Resolves quantity, lots and unit against a locked line item and inserts one
/// movement per lot the quantity was spread over.
async fn book_movement(
    conn: &mut PgConnection,
    settings: &LedgerSettings,
    ledger: &LineLedger,
    request: MovementRequest,
    user_id: Uuid,
) -> AppResult<(MovementQuantity, Vec<Allocation>, Vec<WarehouseMovement>)> {
    let purchase = ledger.line.quantity();
    let quantity = MovementQuantity::resolve(request.packs, request.units, &purchase)?;

    let shares = allocate_movement(
        quantity.total,
        request.movement_type,
        &purchase,
        &ledger.lot_records(),
        &ledger.movement_records(),
        request.lot_id,
        settings.lot_selection,
    )?;

    let unit_of_measure_id = resolve_unit_of_measure(
        request.unit_of_measure_id,
        quantity.packs,
        ledger.line.bulk_unit_of_measure_id,
        settings.default_unit_of_measure_id,
    );

    let mut booked = Vec::with_capacity(shares.len());
    for share in &shares {
        let (packs, units) = share_counts(&quantity, share.quantity, &purchase)?;
        let total_quantity = i32::try_from(share.quantity)
            .map_err(|_| LedgerError::validation("movement quantity is out of range"))?;

        let movement = sqlx::query_as::<_, WarehouseMovement>(
            r#"
            INSERT INTO warehouse_movements (
                line_item_id, product_id, lot_id, packs, units, total_quantity,
                movement_type, unit_of_measure_id, recorded_by, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, clock_timestamp()))
            RETURNING *
            "#,
        )
        .bind(ledger.line.id)
        .bind(ledger.line.product_id)
        .bind(share.lot_id)
        .bind(packs)
        .bind(units)
        .bind(total_quantity)
        .bind(request.movement_type.code())
        .bind(unit_of_measure_id)
        .bind(user_id)
        .bind(request.recorded_at)
        .fetch_one(&mut *conn)
        .await?;

        booked.push(movement);
    }

    Ok((quantity, shares, booked))
}

pub async fn record_movement(
    db: &Database,
    settings: &LedgerSettings,
    user_id: Uuid,
    payload: MovementPayload,
) -> AppResult<MovementReceipt> {
    let mut tx = db.begin().await?;

    let ledger = lock_line_ledger(&mut *tx, payload.line_item_id).await?;
    let request = MovementRequest::from(&payload);
    let (quantity, shares, movements) = book_movement(&mut *tx, settings, &ledger, request, user_id).await?;

    let delta = i64::from(request.movement_type.stock_sign()) * quantity.total;
    let current_stock = adjust_stock(&mut *tx, ledger.line.product_id, delta).await?;

    tx.commit().await?;

    log::info!(
        "{:?} of {} units booked on line item {} over {} lot share(s)",
        request.movement_type,
        quantity.total,
        ledger.line.id,
        shares.len()
    );

    Ok(MovementReceipt { movements, current_stock })
}

pub async fn receive_into_warehouse(
    db: &Database,
    settings: &LedgerSettings,
    user_id: Uuid,
    payload: ReceivePayload,
) -> AppResult<IntakeReceipt> {
    let barcodes: Vec<&str> = payload.barcodes.iter().map(|b| b.trim()).collect();
    if barcodes.iter().any(|b| b.is_empty()) {
        return Err(LedgerError::validation("barcodes cannot be blank").into());
    }

    let mut tx = db.begin().await?;

    let ledger = lock_line_ledger(&mut *tx, payload.line_item_id).await?;
    let request = MovementRequest {
        packs: payload.packs,
        units: payload.units,
        movement_type: MovementType::Intake,
        unit_of_measure_id: None,
        lot_id: payload.lot_id,
        recorded_at: None,
    };
    let (quantity, shares, movements) = book_movement(&mut *tx, settings, &ledger, request, user_id).await?;
    let units = plan_barcode_units(&barcodes, &quantity, ledger.line.quantity().pack_size(), &shares)?;

    let received_now = i32::try_from(quantity.total)
        .map_err(|_| LedgerError::validation("movement quantity is out of range"))?;
    let intake = sqlx::query_as::<_, IntakeRecord>(
        r#"
        INSERT INTO intake_records (line_item_id, quantity, received_by)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(ledger.line.id)
    .bind(received_now)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    let current_stock = adjust_stock(&mut *tx, ledger.line.product_id, quantity.total).await?;

    for unit in &units {
        let unit_quantity = i32::try_from(unit.quantity)
            .map_err(|_| LedgerError::validation("barcode quantity is out of range"))?;
        sqlx::query(
            "INSERT INTO product_units (product_id, lot_id, barcode, quantity) VALUES ($1, $2, $3, $4)"
        )
        .bind(ledger.line.product_id)
        .bind(unit.lot_id)
        .bind(unit.barcode)
        .bind(unit_quantity)
        .execute(&mut *tx)
        .await?;
    }

    let received: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM intake_records WHERE line_item_id = $1"
    )
    .bind(ledger.line.id)
    .fetch_one(&mut *tx)
    .await?;

    let line_received = received >= ledger.line.quantity().total();
    if line_received && !ledger.line.is_received() {
        sqlx::query("UPDATE purchase_line_items SET status = $1 WHERE id = $2")
            .bind(LINE_RECEIVED)
            .bind(ledger.line.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    log::info!(
        "Received {} units of product {} from line item {} over {} lot share(s), {} barcode(s)",
        intake.quantity,
        ledger.line.product_id,
        ledger.line.id,
        shares.len(),
        units.len()
    );

    Ok(IntakeReceipt {
        intake,
        movements,
        current_stock,
        line_received,
        barcodes_registered: units.len(),
    })
}

pub async fn list_intake_records(db: &Database) -> AppResult<Vec<IntakeRecord>> {
    let records = sqlx::query_as::<_, IntakeRecord>(
        "SELECT * FROM intake_records ORDER BY received_at DESC"
    )
    .fetch_all(db)
    .await?;

    Ok(records)
}

pub async fn list_movements(db: &Database, line_item_id: Option<Uuid>) -> AppResult<Vec<WarehouseMovement>> {
    let movements = sqlx::query_as::<_, WarehouseMovement>(
        r#"
        SELECT * FROM warehouse_movements
        WHERE ($1::UUID IS NULL OR line_item_id = $1)
        ORDER BY recorded_at DESC
        "#,
    )
    .bind(line_item_id)
    .fetch_all(db)
    .await?;

    Ok(movements)
}

/// Lots of a product with what is left in each, soonest expiry first, undated last.
pub async fn product_lots(
    db: &Database,
    settings: &LedgerSettings,
    product_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Vec<LotBalance>> {
    let lots = sqlx::query_as::<_, Lot>(
        "SELECT * FROM lots WHERE product_id = $1 ORDER BY expires_at ASC NULLS LAST, created_at"
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;

    let movements = sqlx::query_as::<_, WarehouseMovement>(
        "SELECT * FROM warehouse_movements WHERE product_id = $1 AND lot_id IS NOT NULL"
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;

    let records: Vec<MovementRecord> = movements.iter().map(MovementRecord::from).collect();
    let flows = flow_by_lot(&records);

    Ok(lots
        .iter()
        .map(|lot| lot_balance(&LotRecord::from(lot), &flows, now, settings.near_expiry_days))
        .collect())
}

pub async fn set_lot_active(db: &Database, lot_id: Uuid, active: bool) -> AppResult<Lot> {
    let lot = sqlx::query_as::<_, Lot>(
        "UPDATE lots SET is_active = $1 WHERE id = $2 RETURNING *"
    )
    .bind(active)
    .bind(lot_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| LedgerError::not_found(format!("lot {}", lot_id)))?;

    log::info!("Lot {} ({}) marked active = {}", lot.id, lot.lot_number, active);

    Ok(lot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn movement_payload_becomes_request() {
        let line_item_id = Uuid::new_v4();
        let lot_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let payload = MovementPayload {
            line_item_id,
            packs: 2,
            units: 3,
            movement_type: MovementType::Egress,
            unit_of_measure_id: Some(4),
            lot_id: Some(lot_id),
            recorded_at: Some(at),
        };

        let request = MovementRequest::from(&payload);
        assert_eq!(request.packs, 2);
        assert_eq!(request.units, 3);
        assert_eq!(request.movement_type, MovementType::Egress);
        assert_eq!(request.unit_of_measure_id, Some(4));
        assert_eq!(request.lot_id, Some(lot_id));
        assert_eq!(request.recorded_at, Some(at));
    }

    #[test]
    fn movement_payload_deserializes_with_defaults() {
        let id = Uuid::new_v4();
        let payload: MovementPayload = serde_json::from_value(serde_json::json!({
            "line_item_id": id,
            "units": 5,
            "movement_type": "intake"
        }))
        .unwrap();

        assert_eq!(payload.packs, 0);
        assert_eq!(payload.units, 5);
        assert_eq!(payload.movement_type, MovementType::Intake);
        assert!(payload.lot_id.is_none());
    }

    fn entered(packs: i32, units: i32, pack_size: i64) -> MovementQuantity {
        MovementQuantity {
            packs,
            units,
            total: i64::from(packs) * pack_size + i64::from(units),
        }
    }

    #[test]
    fn pack_barcodes_stand_for_a_whole_pack() {
        let (l1, l2) = (Uuid::new_v4(), Uuid::new_v4());
        let shares = vec![
            Allocation { lot_id: Some(l1), quantity: 20 },
            Allocation { lot_id: Some(l2), quantity: 11 },
        ];
        let codes = ["P1", "P2", "P3", "U1"];

        let units = plan_barcode_units(&codes, &entered(3, 1, 10), 10, &shares).unwrap();

        let quantities: Vec<i64> = units.iter().map(|u| u.quantity).collect();
        assert_eq!(quantities, vec![10, 10, 10, 1]);
        let lots: Vec<Option<Uuid>> = units.iter().map(|u| u.lot_id).collect();
        assert_eq!(lots, vec![Some(l1), Some(l1), Some(l2), Some(l2)]);
    }

    #[test]
    fn barcode_count_must_match_what_was_entered() {
        let shares = vec![Allocation { lot_id: None, quantity: 5 }];
        let err = plan_barcode_units(&["A", "B"], &entered(0, 5, 1), 1, &shares).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(msg) if msg.contains("expected 5")));
    }

    #[test]
    fn intake_without_barcodes_registers_none() {
        let shares = vec![Allocation { lot_id: None, quantity: 5 }];
        assert!(plan_barcode_units(&[], &entered(0, 5, 1), 1, &shares).unwrap().is_empty());
    }

    #[test]
    fn single_share_keeps_entered_counts() {
        let purchase = PurchaseQuantity::Bulk { packs: 10, units_per_pack: 10 };
        let quantity = entered(6, 5, 10);
        assert_eq!(share_counts(&quantity, 65, &purchase).unwrap(), (6, 5));
    }

    #[test]
    fn split_shares_are_counted_in_packs() {
        let purchase = PurchaseQuantity::Bulk { packs: 10, units_per_pack: 10 };
        let quantity = entered(10, 0, 10);
        assert_eq!(share_counts(&quantity, 60, &purchase).unwrap(), (6, 0));
        assert_eq!(share_counts(&quantity, 45, &purchase).unwrap(), (4, 5));

        let loose = PurchaseQuantity::Individual { units: 30 };
        assert_eq!(share_counts(&entered(0, 30, 1), 12, &loose).unwrap(), (0, 12));
    }
}

