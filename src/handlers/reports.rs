//! Read-only reports. All stock figures come from the ledger projections,
//! the stored counter is shown next to them and never used to derive them.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Html,
    Json,
};
use askama::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppResult,
    filters,
    handlers::sales::DateRange,
    ledger::{
        detect_drift, ledger_flow, summarize_product, ExpiryCounts, LineItemBalance, LotBalance,
        MovementRecord, MovementType, PackBreakdown, ProductStockSummary, StockDrift, StockOverview,
    },
    middleware::{get_current_user, CurrentUser},
    models::{Role, WarehouseMovement},
    services::{
        sales::units_sold_by_product,
        stock::{load_line_ledgers, LineFilter, LineLedger},
    },
    state::AppState,
};

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub current_stock: i32,
    pub reorder_threshold: i32,
}

#[derive(Debug, Serialize)]
pub struct ProductStockRow {
    pub product_id: Uuid,
    pub name: String,
    pub stored_stock: i32,
    pub summary: ProductStockSummary,
    pub lots: Vec<LotBalance>,
}

#[derive(Debug, Serialize)]
pub struct WarehouseReport {
    pub generated_at: DateTime<Utc>,
    pub overview: StockOverview,
    pub products: Vec<ProductStockRow>,
}

#[derive(Debug, Serialize)]
pub struct MovementEntry {
    pub id: Uuid,
    pub lot_number: Option<String>,
    pub packs: i32,
    pub units: i32,
    pub quantity: i32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LineMovements {
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub purchased_at: DateTime<Utc>,
    pub intake: Vec<MovementEntry>,
    pub egress: Vec<MovementEntry>,
    pub remaining: PackBreakdown,
    pub on_hand: i64,
    pub active_lots: Vec<LotBalance>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct MovementSummary {
    pub line_items: usize,
    pub total_intake: i64,
    pub total_egress: i64,
    pub near_expiry_lots: usize,
    pub expired_lots: usize,
}

#[derive(Debug, Serialize)]
pub struct MovementReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: MovementSummary,
    pub lines: Vec<LineMovements>,
}

#[derive(Debug, Serialize)]
pub struct LineHistory {
    pub line_item_id: Uuid,
    pub product_name: String,
    pub overdrawn: bool,
    pub balance: LineItemBalance,
    pub movements: Vec<WarehouseMovement>,
}

#[derive(Debug, Serialize)]
pub struct DriftRow {
    pub product_name: String,
    #[serde(flatten)]
    pub drift: StockDrift,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub product_id: Option<Uuid>,
}

#[derive(Template)]
#[template(path = "reports/warehouse.html")]
struct WarehouseReportTemplate {
    report: WarehouseReport,
    current_user: CurrentUser,
    near_expiry_days: i64,
}

async fn load_products(state: &AppState) -> AppResult<Vec<ProductRow>> {
    let products = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, current_stock, reorder_threshold FROM products WHERE is_active ORDER BY name"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(products)
}

pub fn build_warehouse_report(
    products: Vec<ProductRow>,
    ledgers: &[LineLedger],
    now: DateTime<Utc>,
    window_days: i64,
) -> WarehouseReport {
    let mut balances: HashMap<Uuid, Vec<LineItemBalance>> = HashMap::new();
    for ledger in ledgers {
        balances
            .entry(ledger.line.product_id)
            .or_default()
            .push(ledger.balance(now, window_days));
    }

    let rows: Vec<ProductStockRow> = products
        .into_iter()
        .map(|product| {
            let product_balances = balances.remove(&product.id).unwrap_or_default();
            let summary = summarize_product(product.reorder_threshold, &product_balances);
            let lots = product_balances
                .iter()
                .flat_map(|b| b.lots_with_stock().cloned())
                .collect();
            ProductStockRow {
                product_id: product.id,
                name: product.name,
                stored_stock: product.current_stock,
                summary,
                lots,
            }
        })
        .collect();

    WarehouseReport {
        generated_at: now,
        overview: StockOverview::from_products(rows.iter().map(|row| &row.summary)),
        products: rows,
    }
}

async fn warehouse_report(state: &AppState) -> AppResult<WarehouseReport> {
    let products = load_products(state).await?;
    let ledgers = load_line_ledgers(&state.db, &LineFilter::default()).await?;
    Ok(build_warehouse_report(
        products,
        &ledgers,
        Utc::now(),
        state.ledger().near_expiry_days,
    ))
}

pub async fn warehouse_json(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<WarehouseReport>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    Ok(Json(warehouse_report(&state).await?))
}

pub async fn warehouse_page(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Html<String>> {
    let current_user = get_current_user(&cookies, &state).await?;
    current_user.require(&[Role::Warehouse])?;

    let template = WarehouseReportTemplate {
        report: warehouse_report(&state).await?,
        near_expiry_days: state.ledger().near_expiry_days,
        current_user,
    };

    Ok(Html(template.render()?))
}

fn entry(movement: &WarehouseMovement, lot_numbers: &HashMap<Uuid, String>) -> MovementEntry {
    MovementEntry {
        id: movement.id,
        lot_number: movement.lot_id.and_then(|id| lot_numbers.get(&id).cloned()),
        packs: movement.packs,
        units: movement.units,
        quantity: movement.total_quantity,
        recorded_at: movement.recorded_at,
    }
}

pub fn build_movement_report(
    ledgers: &[LineLedger],
    product_names: &HashMap<Uuid, String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    window_days: i64,
) -> MovementReport {
    let mut summary = MovementSummary::default();
    let mut lines = Vec::with_capacity(ledgers.len());

    for ledger in ledgers {
        let balance = ledger.balance(now, window_days);
        let lot_numbers: HashMap<Uuid, String> = ledger
            .lots
            .iter()
            .map(|lot| (lot.id, lot.lot_number.clone()))
            .collect();

        let (intake, egress): (Vec<&WarehouseMovement>, Vec<&WarehouseMovement>) = ledger
            .movements
            .iter()
            .partition(|m| m.kind() == MovementType::Intake);

        let records: Vec<MovementRecord> = ledger.movement_records();
        let (intake_units, egress_units) = ledger_flow(&records);
        let expiry = ExpiryCounts::tally(&balance.lots);

        summary.line_items += 1;
        summary.total_intake += intake_units;
        summary.total_egress += egress_units;
        summary.near_expiry_lots += expiry.near_expiry;
        summary.expired_lots += expiry.expired;

        lines.push(LineMovements {
            line_item_id: ledger.line.id,
            product_id: ledger.line.product_id,
            product_name: product_names
                .get(&ledger.line.product_id)
                .cloned()
                .unwrap_or_default(),
            purchased_at: ledger.line.created_at,
            intake: intake.into_iter().map(|m| entry(m, &lot_numbers)).collect(),
            egress: egress.into_iter().map(|m| entry(m, &lot_numbers)).collect(),
            remaining: balance.breakdown,
            on_hand: balance.on_hand,
            active_lots: balance
                .lots
                .iter()
                .filter(|lot| lot.is_active && lot.in_stock() > 0)
                .cloned()
                .collect(),
        });
    }

    MovementReport { start, end, summary, lines }
}

async fn product_names(state: &AppState) -> AppResult<HashMap<Uuid, String>> {
    let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM products")
        .fetch_all(&state.db)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn movements_report(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(range): Query<DateRange>,
) -> AppResult<Json<MovementReport>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let now = Utc::now();
    let (start, end) = range.resolve(now)?;
    let filter = LineFilter {
        from: Some(start),
        to: Some(end),
        ..LineFilter::default()
    };

    let ledgers = load_line_ledgers(&state.db, &filter).await?;
    let names = product_names(&state).await?;

    Ok(Json(build_movement_report(
        &ledgers,
        &names,
        start,
        end,
        now,
        state.ledger().near_expiry_days,
    )))
}

pub async fn warehouse_history(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<LineHistory>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let filter = LineFilter {
        product_id: query.product_id,
        ..LineFilter::default()
    };
    let now = Utc::now();
    let window = state.ledger().near_expiry_days;
    let names = product_names(&state).await?;

    let history = load_line_ledgers(&state.db, &filter)
        .await?
        .into_iter()
        .map(|ledger| {
            let balance = ledger.balance(now, window);
            if balance.is_overdrawn() {
                log::warn!(
                    "Line item {} received more than it purchased or released more than it received",
                    ledger.line.id
                );
            }
            LineHistory {
                line_item_id: ledger.line.id,
                product_name: names.get(&ledger.line.product_id).cloned().unwrap_or_default(),
                overdrawn: balance.is_overdrawn(),
                balance,
                movements: ledger.movements,
            }
        })
        .collect();

    Ok(Json(history))
}

pub fn find_drift(
    products: &[ProductRow],
    ledgers: &[LineLedger],
    sold: &HashMap<Uuid, i64>,
) -> Vec<DriftRow> {
    let mut flows: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for ledger in ledgers {
        let (intake, egress) = ledger_flow(&ledger.movement_records());
        let flow = flows.entry(ledger.line.product_id).or_default();
        flow.0 += intake;
        flow.1 += egress;
    }

    products
        .iter()
        .filter_map(|product| {
            let (intake, egress) = flows.get(&product.id).copied().unwrap_or_default();
            let sold = sold.get(&product.id).copied().unwrap_or(0);
            detect_drift(product.id, product.current_stock, intake, egress, sold).map(|drift| DriftRow {
                product_name: product.name.clone(),
                drift,
            })
        })
        .collect()
}

pub async fn stock_drift(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<DriftRow>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    let products = load_products(&state).await?;
    let ledgers = load_line_ledgers(&state.db, &LineFilter::default()).await?;
    let sold: HashMap<Uuid, i64> = units_sold_by_product(&state.db).await?.into_iter().collect();

    let drift = find_drift(&products, &ledgers, &sold);
    if !drift.is_empty() {
        log::warn!("{} product(s) have a stock counter that disagrees with the ledger", drift.len());
    }

    Ok(Json(drift))
}
