use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppResult,
    ledger::{LineItemBalance, PurchaseQuantity},
    middleware::get_current_user,
    models::{CreatePurchase, Lot, Purchase, PurchaseLineItem, Role},
    services::{
        purchases::create_purchase as register_purchase,
        stock::{load_line_ledgers, LineFilter},
    },
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Received,
    Pending,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    purchase_id: Uuid,
    line_item_id: Uuid,
    product_name: String,
    bulk_quantity: i32,
    units_per_bulk: i32,
    individual_quantity: i32,
    received: i64,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HistoryLine {
    pub line_item_id: Uuid,
    pub product_name: String,
    pub purchased: i64,
    pub received: i64,
    pub pending: i64,
    pub is_received: bool,
}

#[derive(Debug, Serialize)]
pub struct PurchaseHistory {
    pub id: Uuid,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub status: PurchaseStatus,
    pub lines: Vec<HistoryLine>,
}

#[derive(Debug, Serialize)]
pub struct PendingLine {
    pub line: PurchaseLineItem,
    pub lots: Vec<Lot>,
    pub balance: LineItemBalance,
}

impl From<HistoryRow> for HistoryLine {
    fn from(row: HistoryRow) -> Self {
        let purchased = PurchaseQuantity::from_columns(
            row.bulk_quantity,
            row.units_per_bulk,
            row.individual_quantity,
        )
        .total();
        Self {
            line_item_id: row.line_item_id,
            product_name: row.product_name,
            purchased,
            received: row.received,
            pending: (purchased - row.received).max(0),
            is_received: row.received >= purchased,
        }
    }
}

fn purchase_status(lines: &[HistoryLine]) -> PurchaseStatus {
    if lines.iter().all(|line| line.is_received) {
        PurchaseStatus::Received
    } else {
        PurchaseStatus::Pending
    }
}

pub async fn create_purchase(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CreatePurchase>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let purchase = register_purchase(&state.db, state.ledger(), user.id, payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": purchase.id }))))
}

pub async fn purchase_history(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<PurchaseHistory>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let purchases = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT li.purchase_id, li.id AS line_item_id, p.name AS product_name,
               li.bulk_quantity, li.units_per_bulk, li.individual_quantity,
               COALESCE((SELECT SUM(ir.quantity) FROM intake_records ir WHERE ir.line_item_id = li.id), 0)::BIGINT AS received
        FROM purchase_line_items li
        JOIN products p ON p.id = li.product_id
        ORDER BY li.created_at
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(assemble_history(purchases, rows)))
}

fn assemble_history(purchases: Vec<Purchase>, rows: Vec<HistoryRow>) -> Vec<PurchaseHistory> {
    let mut by_purchase: HashMap<Uuid, Vec<HistoryLine>> = HashMap::new();
    for row in rows {
        by_purchase.entry(row.purchase_id).or_default().push(HistoryLine::from(row));
    }

    purchases
        .into_iter()
        .map(|purchase| {
            let lines = by_purchase.remove(&purchase.id).unwrap_or_default();
            PurchaseHistory {
                id: purchase.id,
                total: purchase.total,
                created_at: purchase.created_at,
                status: purchase_status(&lines),
                lines,
            }
        })
        .collect()
}

pub async fn pending_lines(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<PendingLine>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let filter = LineFilter {
        pending_only: true,
        ..LineFilter::default()
    };
    let now = Utc::now();
    let window = state.ledger().near_expiry_days;

    let pending = load_line_ledgers(&state.db, &filter)
        .await?
        .into_iter()
        .map(|ledger| {
            let balance = ledger.balance(now, window);
            PendingLine {
                line: ledger.line,
                lots: ledger.lots,
                balance,
            }
        })
        .collect();

    Ok(Json(pending))
}
