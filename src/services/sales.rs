//! Point of sale. A sale lowers the product stock counter directly; it does
//! not book a warehouse movement, so the drift report is what reconciles the two.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppResult,
    ledger::LedgerError,
    models::{CreateSale, ProductUnit, Sale, SaleDisplay},
    services::stock::adjust_stock,
};

pub async fn create_sale(
    db: &Database,
    anonymous_customer_id: Option<Uuid>,
    user_id: Uuid,
    payload: CreateSale,
) -> AppResult<Sale> {
    if payload.lines.is_empty() {
        return Err(LedgerError::validation("a sale needs at least one item").into());
    }
    if let Some(line) = payload.lines.iter().find(|line| line.quantity <= 0) {
        return Err(LedgerError::validation(format!(
            "sold quantity must be positive for product {}",
            line.product_id
        ))
        .into());
    }

    let customer_id = payload.sale.customer_id.or(anonymous_customer_id);

    let mut tx = db.begin().await?;

    let sale = sqlx::query_as::<_, Sale>(
        r#"
        INSERT INTO sales (customer_id, subtotal, discount, total, amount_received, change_given, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(customer_id)
    .bind(payload.sale.subtotal)
    .bind(payload.sale.discount)
    .bind(payload.sale.total)
    .bind(payload.sale.amount_received)
    .bind(payload.sale.change_given)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    for line in &payload.lines {
        sqlx::query(
            r#"
            INSERT INTO sale_line_items (sale_id, product_id, quantity, unit_price, discount, subtotal, total, barcode)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(sale.id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.discount)
        .bind(line.subtotal)
        .bind(line.total)
        .bind(&line.barcode)
        .execute(&mut *tx)
        .await?;

        adjust_stock(&mut *tx, line.product_id, -i64::from(line.quantity)).await?;

        if let Some(barcode) = line.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            let consumed = sqlx::query(
                r#"
                UPDATE product_units SET is_available = FALSE
                WHERE id = (
                    SELECT id FROM product_units
                    WHERE barcode = $1 AND product_id = $2 AND is_available
                    ORDER BY created_at
                    LIMIT 1
                    FOR UPDATE
                )
                "#,
            )
            .bind(barcode)
            .bind(line.product_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if consumed == 0 {
                return Err(LedgerError::not_found(format!("available unit with barcode {}", barcode)).into());
            }
        }
    }

    tx.commit().await?;

    log::info!(
        "Sale {} recorded with {} item(s) by user {}",
        sale.id,
        payload.lines.len(),
        user_id
    );

    Ok(sale)
}

pub async fn list_sales(
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<Vec<SaleDisplay>> {
    let sales = sqlx::query_as::<_, SaleDisplay>(
        r#"
        SELECT
            s.id,
            COALESCE(c.name, 'Cliente anónimo') AS customer_name,
            COALESCE(u.first_name || ' ' || u.last_name, '') AS seller_name,
            s.total,
            (SELECT COUNT(*) FROM sale_line_items li WHERE li.sale_id = s.id) AS item_count,
            s.created_at
        FROM sales s
        LEFT JOIN customers c ON c.id = s.customer_id
        LEFT JOIN users u ON u.id = s.created_by
        WHERE s.created_at BETWEEN $1 AND $2
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    Ok(sales)
}

pub async fn find_barcode_unit(db: &Database, barcode: &str) -> AppResult<ProductUnit> {
    let unit = sqlx::query_as::<_, ProductUnit>(
        r#"
        SELECT * FROM product_units
        WHERE barcode = $1 AND is_available
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(barcode.trim())
    .fetch_optional(db)
    .await?
    .ok_or_else(|| LedgerError::not_found(format!("available unit with barcode {}", barcode)))?;

    Ok(unit)
}

/// Units sold per product, used when comparing the stock counter with the ledger.
pub async fn units_sold_by_product(db: &Database) -> AppResult<Vec<(Uuid, i64)>> {
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT product_id, COALESCE(SUM(quantity), 0)::BIGINT FROM sale_line_items GROUP BY product_id"
    )
    .fetch_all(db)
    .await?;

    Ok(rows)
}
