//! Loading ledger rows and keeping the product stock counter in step with them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppResult,
    ledger::{reconcile_line_item, LedgerError, LineItemBalance, LotRecord, MovementRecord},
    models::{Lot, PurchaseLineItem, WarehouseMovement, LINE_PENDING},
};

/// A purchase line item together with its lots (creation order) and movements (chronological).
#[derive(Debug)]
pub struct LineLedger {
    pub line: PurchaseLineItem,
    pub lots: Vec<Lot>,
    pub movements: Vec<WarehouseMovement>,
}

impl LineLedger {
    pub fn lot_records(&self) -> Vec<LotRecord> {
        self.lots.iter().map(LotRecord::from).collect()
    }

    pub fn movement_records(&self) -> Vec<MovementRecord> {
        self.movements.iter().map(MovementRecord::from).collect()
    }

    pub fn balance(&self, now: DateTime<Utc>, window_days: i64) -> LineItemBalance {
        reconcile_line_item(
            self.line.quantity(),
            &self.lot_records(),
            &self.movement_records(),
            now,
            window_days,
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct LineFilter {
    pub product_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub pending_only: bool,
}

/// Loads line items matching `filter`, newest first, with their lots and movements.
pub async fn load_line_ledgers(db: &Database, filter: &LineFilter) -> AppResult<Vec<LineLedger>> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM purchase_line_items WHERE TRUE");
    if let Some(product_id) = filter.product_id {
        query.push(" AND product_id = ").push_bind(product_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at <= ").push_bind(to);
    }
    if filter.pending_only {
        query.push(" AND status = ").push_bind(LINE_PENDING);
    }
    query.push(" ORDER BY created_at DESC");

    let lines = query
        .build_query_as::<PurchaseLineItem>()
        .fetch_all(db)
        .await?;

    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = lines.iter().map(|line| line.id).collect();

    let lots = sqlx::query_as::<_, Lot>(
        "SELECT * FROM lots WHERE line_item_id = ANY($1) ORDER BY created_at, id"
    )
    .bind(&ids)
    .fetch_all(db)
    .await?;

    let movements = sqlx::query_as::<_, WarehouseMovement>(
        "SELECT * FROM warehouse_movements WHERE line_item_id = ANY($1) ORDER BY recorded_at, id"
    )
    .bind(&ids)
    .fetch_all(db)
    .await?;

    Ok(group_by_line(lines, lots, movements))
}

fn group_by_line(
    lines: Vec<PurchaseLineItem>,
    lots: Vec<Lot>,
    movements: Vec<WarehouseMovement>,
) -> Vec<LineLedger> {
    let mut lots_by_line: HashMap<Uuid, Vec<Lot>> = HashMap::new();
    for lot in lots {
        lots_by_line.entry(lot.line_item_id).or_default().push(lot);
    }
    let mut movements_by_line: HashMap<Uuid, Vec<WarehouseMovement>> = HashMap::new();
    for movement in movements {
        movements_by_line.entry(movement.line_item_id).or_default().push(movement);
    }

    lines
        .into_iter()
        .map(|line| LineLedger {
            lots: lots_by_line.remove(&line.id).unwrap_or_default(),
            movements: movements_by_line.remove(&line.id).unwrap_or_default(),
            line,
        })
        .collect()
}

/// Loads one line item inside a transaction and holds its row lock until commit,
/// so concurrent movements against the same line are serialized.
pub async fn lock_line_ledger(conn: &mut PgConnection, line_item_id: Uuid) -> AppResult<LineLedger> {
    let line = sqlx::query_as::<_, PurchaseLineItem>(
        "SELECT * FROM purchase_line_items WHERE id = $1 FOR UPDATE"
    )
    .bind(line_item_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| LedgerError::not_found(format!("purchase line item {}", line_item_id)))?;

    let lots = sqlx::query_as::<_, Lot>(
        "SELECT * FROM lots WHERE line_item_id = $1 ORDER BY created_at, id"
    )
    .bind(line_item_id)
    .fetch_all(&mut *conn)
    .await?;

    let movements = sqlx::query_as::<_, WarehouseMovement>(
        "SELECT * FROM warehouse_movements WHERE line_item_id = $1 ORDER BY recorded_at, id"
    )
    .bind(line_item_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(LineLedger { line, lots, movements })
}

/// Applies `delta` to the product's stock counter in a single statement.
/// A decrement that would take the counter below zero is refused.
pub async fn adjust_stock(conn: &mut PgConnection, product_id: Uuid, delta: i64) -> AppResult<i32> {
    let delta = i32::try_from(delta)
        .map_err(|_| LedgerError::validation(format!("stock change {} is out of range", delta)))?;

    let updated = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE products
        SET current_stock = current_stock + $1, updated_at = NOW()
        WHERE id = $2 AND current_stock + $1 >= 0
        RETURNING current_stock
        "#,
    )
    .bind(delta)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = updated {
        return Ok(stock);
    }

    let current = sqlx::query_scalar::<_, i32>("SELECT current_stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("product {}", product_id)))?;

    Err(LedgerError::InsufficientStock {
        requested: -i64::from(delta),
        available: i64::from(current),
    }
    .into())
}
