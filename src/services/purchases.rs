//! Purchase registration: the purchase, its line items and their lots are
//! written in one transaction or not at all.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    ledger::{plan_lots, ExpiryDatePolicy, LedgerError, LedgerSettings, PlannedLot, PurchaseQuantity},
    models::{CreatePurchase, Purchase, PurchaseLinePayload},
};

/// What a purchase is checked against for one product: its name for messages
/// and the lot numbers it already carries.
#[derive(Debug, Default, Clone)]
pub struct ProductLots {
    pub name: String,
    pub lot_numbers: Vec<String>,
}

/// A line item that passed validation, with the lots it will carry.
#[derive(Debug)]
pub struct PlannedLine<'a> {
    pub payload: &'a PurchaseLinePayload,
    pub lots: Vec<PlannedLot>,
}

/// Validates every line before anything is written. Lot numbers planned by an
/// earlier line count as taken for later lines of the same product.
pub fn plan_purchase<'a>(
    lines: &'a [PurchaseLinePayload],
    products: &HashMap<Uuid, ProductLots>,
    expiry_dates: ExpiryDatePolicy,
) -> Result<Vec<PlannedLine<'a>>, LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::validation("a purchase needs at least one line item"));
    }

    let mut taken: HashMap<Uuid, Vec<String>> = HashMap::new();
    let mut planned = Vec::with_capacity(lines.len());

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| LedgerError::not_found(format!("product {}", line.product_id)))?;

        let quantity = PurchaseQuantity::validated(
            &product.name,
            line.bulk_quantity,
            line.units_per_bulk,
            line.individual_quantity,
        )?;

        let existing = taken
            .entry(line.product_id)
            .or_insert_with(|| product.lot_numbers.clone());
        let lots = plan_lots(line.product_id, quantity.total(), &line.lots, existing.as_slice(), expiry_dates)?;
        existing.extend(lots.iter().map(|lot| lot.lot_number.clone()));

        planned.push(PlannedLine { payload: line, lots });
    }

    Ok(planned)
}

/// Locks every product on the purchase, in id order, and loads its lot numbers.
/// The locks serialize lot-number checks for a product across purchases.
async fn lock_products(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    lines: &[PurchaseLinePayload],
) -> AppResult<HashMap<Uuid, ProductLots>> {
    let mut ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    ids.sort();
    ids.dedup();

    let rows = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    let mut products: HashMap<Uuid, ProductLots> = rows
        .into_iter()
        .map(|(id, name)| (id, ProductLots { name, lot_numbers: Vec::new() }))
        .collect();

    let lots = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT product_id, lot_number FROM lots WHERE product_id = ANY($1)"
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    for (product_id, lot_number) in lots {
        if let Some(product) = products.get_mut(&product_id) {
            product.lot_numbers.push(lot_number);
        }
    }

    Ok(products)
}

pub async fn create_purchase(
    db: &Database,
    settings: &LedgerSettings,
    user_id: Uuid,
    payload: CreatePurchase,
) -> AppResult<Purchase> {
    let mut tx = db.begin().await?;

    let products = lock_products(&mut tx, &payload.lines).await?;
    let planned = plan_purchase(&payload.lines, &products, settings.expiry_dates)?;

    let purchase = sqlx::query_as::<_, Purchase>(
        r#"
        INSERT INTO purchases (subtotal, discount, total, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.purchase.subtotal)
    .bind(payload.purchase.discount)
    .bind(payload.purchase.total)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    for line in &planned {
        let line_item_id = insert_line_item(&mut tx, purchase.id, user_id, line.payload).await?;
        for lot in &line.lots {
            insert_lot(&mut tx, line_item_id, line.payload.product_id, user_id, lot).await?;
        }

        log::debug!(
            "Line item {} for product {} planned into {} lot(s)",
            line_item_id,
            line.payload.product_id,
            line.lots.len()
        );
    }

    tx.commit().await?;

    log::info!(
        "Purchase {} registered with {} line item(s) by user {}",
        purchase.id,
        planned.len(),
        user_id
    );

    Ok(purchase)
}

async fn insert_line_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    purchase_id: Uuid,
    user_id: Uuid,
    line: &PurchaseLinePayload,
) -> AppResult<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO purchase_line_items (
            purchase_id, product_id, bulk_quantity, bulk_unit_price, units_per_bulk,
            bulk_unit_of_measure_id, individual_quantity, unit_price, bulk_discount,
            individual_discount, subtotal, discount, total, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING id
        "#,
    )
    .bind(purchase_id)
    .bind(line.product_id)
    .bind(line.bulk_quantity)
    .bind(line.bulk_unit_price)
    .bind(line.units_per_bulk)
    .bind(line.bulk_unit_of_measure_id)
    .bind(line.individual_quantity)
    .bind(line.unit_price)
    .bind(line.bulk_discount)
    .bind(line.individual_discount)
    .bind(line.subtotal)
    .bind(line.discount)
    .bind(line.total)
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

async fn insert_lot(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    line_item_id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    lot: &PlannedLot,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO lots (line_item_id, product_id, lot_number, expires_at, initial_quantity, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(line_item_id)
    .bind(product_id)
    .bind(&lot.lot_number)
    .bind(lot.expires_at)
    .bind(lot.initial_quantity)
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        AppError::from_unique_violation(
            e,
            format!("lot number {} already exists for product {}", lot.lot_number, product_id),
        )
    })?;

    Ok(())
}
