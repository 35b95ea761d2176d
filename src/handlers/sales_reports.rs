//! Sales dashboards and reports. Grouping and sums happen in SQL; the
//! functions here only shape the grouped rows.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    handlers::sales::DateRange,
    middleware::get_current_user,
    models::Role,
    state::AppState,
};

const DAILY_WINDOW_DAYS: i64 = 30;
const DEFAULT_TOP_PRODUCTS: i64 = 5;
const MAX_TOP_PRODUCTS: i64 = 50;
/// Percent of all units sold above which a product is a best seller.
const BEST_SELLER_SHARE: f64 = 5.0;
/// Percent of all units sold below which a product moves slowly.
const SLOW_MOVER_SHARE: f64 = 1.0;
const ACTIVE_CUSTOMER_DAYS: i64 = 30;

#[derive(Debug, Clone, FromRow)]
pub struct DailyRow {
    pub day: NaiveDate,
    pub sales: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub sales: i64,
    pub total: Decimal,
}

/// One entry per day from `first` to `last`; days without sales stay at zero.
pub fn daily_series(rows: &[DailyRow], first: NaiveDate, last: NaiveDate) -> Vec<DailySales> {
    let by_day: HashMap<NaiveDate, &DailyRow> = rows.iter().map(|row| (row.day, row)).collect();
    let mut series = Vec::new();
    let mut day = first;
    while day <= last {
        series.push(match by_day.get(&day) {
            Some(row) => DailySales {
                day,
                sales: row.sales,
                total: row.total,
            },
            None => DailySales {
                day,
                sales: 0,
                total: Decimal::ZERO,
            },
        });
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    series
}

#[derive(Debug, Clone, FromRow)]
pub struct MonthRow {
    pub month: i32,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyTotals {
    pub month: u32,
    pub purchases: Decimal,
    pub sales: Decimal,
}

fn month_slot(months: &mut [MonthlyTotals], month: i32) -> Option<&mut MonthlyTotals> {
    let index = usize::try_from(month).ok()?.checked_sub(1)?;
    months.get_mut(index)
}

/// Twelve entries, January first, with purchase and sale totals side by side.
pub fn monthly_series(purchases: &[MonthRow], sales: &[MonthRow]) -> Vec<MonthlyTotals> {
    let mut months: Vec<MonthlyTotals> = (1..=12)
        .map(|month| MonthlyTotals {
            month,
            purchases: Decimal::ZERO,
            sales: Decimal::ZERO,
        })
        .collect();

    for row in purchases {
        if let Some(slot) = month_slot(&mut months, row.month) {
            slot.purchases += row.total;
        }
    }
    for row in sales {
        if let Some(slot) = month_slot(&mut months, row.month) {
            slot.sales += row.total;
        }
    }
    months
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductMonthRow {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub month: String,
    pub quantity: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthQuantity {
    pub month: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub total: Decimal,
    pub average_price: Decimal,
    pub share_percent: f64,
    pub trend: Vec<MonthQuantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductSalesSummary {
    pub total_products: usize,
    pub total_units: i64,
    pub average_units_per_product: f64,
    pub best_sellers: usize,
    pub slow_movers: usize,
}

#[derive(Debug, Serialize)]
pub struct SalesByProductReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: ProductSalesSummary,
    pub products: Vec<ProductSales>,
}

fn share(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

fn average(total: Decimal, count: i64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(count)).round_dp(2)
}

/// Folds per-product, per-month rows into one entry per product, best sellers first.
pub fn summarize_sales_by_product(rows: &[ProductMonthRow]) -> (ProductSalesSummary, Vec<ProductSales>) {
    let mut products: Vec<ProductSales> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for row in rows {
        let position = *positions.entry(row.product_id).or_insert_with(|| {
            products.push(ProductSales {
                product_id: row.product_id,
                name: row.name.clone(),
                category: row.category.clone(),
                quantity: 0,
                total: Decimal::ZERO,
                average_price: Decimal::ZERO,
                share_percent: 0.0,
                trend: Vec::new(),
            });
            products.len() - 1
        });
        let product = &mut products[position];
        product.quantity += row.quantity;
        product.total += row.total;
        product.trend.push(MonthQuantity {
            month: row.month.clone(),
            quantity: row.quantity,
        });
    }

    let total_units: i64 = products.iter().map(|p| p.quantity).sum();
    for product in &mut products {
        product.average_price = average(product.total, product.quantity);
        product.share_percent = share(product.quantity, total_units);
        product.trend.sort_by(|a, b| a.month.cmp(&b.month));
    }
    products.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));

    let summary = ProductSalesSummary {
        total_products: products.len(),
        total_units,
        average_units_per_product: if products.is_empty() {
            0.0
        } else {
            total_units as f64 / products.len() as f64
        },
        best_sellers: products.iter().filter(|p| p.share_percent > BEST_SELLER_SHARE).count(),
        slow_movers: products.iter().filter(|p| p.share_percent < SLOW_MOVER_SHARE).count(),
    };

    (summary, products)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    #[default]
    Day,
    Week,
    Month,
}

impl Grouping {
    /// Field name understood by Postgres `date_trunc`.
    fn unit(&self) -> &'static str {
        match self {
            Grouping::Day => "day",
            Grouping::Week => "week",
            Grouping::Month => "month",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PeriodRow {
    pub period: DateTime<Utc>,
    pub sales: i64,
    pub total: Decimal,
    pub units: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvolutionSummary {
    pub total_sales: Decimal,
    pub total_units: i64,
    pub average_per_period: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PeriodSales {
    pub period: DateTime<Utc>,
    pub sales: i64,
    pub total: Decimal,
    pub units: i64,
}

#[derive(Debug, Serialize)]
pub struct SalesEvolution {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: EvolutionSummary,
    pub periods: Vec<PeriodSales>,
    pub top_products: Vec<TopProduct>,
}

pub fn summarize_evolution(rows: &[PeriodRow]) -> EvolutionSummary {
    let total_sales: Decimal = rows.iter().map(|row| row.total).sum();
    let periods = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    EvolutionSummary {
        total_sales,
        total_units: rows.iter().map(|row| row.units).sum(),
        average_per_period: average(total_sales, periods),
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    pub customer_id: Uuid,
    pub name: String,
    pub purchases: i64,
    pub spent: Decimal,
    pub last_purchase: DateTime<Utc>,
    pub first_ever: DateTime<Utc>,
    pub last_ever: DateTime<Utc>,
    pub lifetime_purchases: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseFrequency {
    Frequent,
    Moderate,
    Occasional,
}

impl PurchaseFrequency {
    /// Up to a month between purchases is frequent, up to three is moderate.
    /// A customer with a single purchase has no interval and is occasional.
    pub fn from_interval(days: Option<f64>) -> Self {
        match days {
            Some(days) if days <= 30.0 => Self::Frequent,
            Some(days) if days <= 90.0 => Self::Moderate,
            _ => Self::Occasional,
        }
    }
}

/// Mean days between a customer's purchases over their whole history.
pub fn purchase_interval_days(first: DateTime<Utc>, last: DateTime<Utc>, purchases: i64) -> Option<f64> {
    (purchases > 1).then(|| (last - first).num_days() as f64 / (purchases - 1) as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerActivity {
    pub customer_id: Uuid,
    pub name: String,
    pub purchases: i64,
    pub spent: Decimal,
    pub average_ticket: Decimal,
    pub last_purchase: DateTime<Utc>,
    pub days_since_last_purchase: i64,
    pub interval_days: Option<f64>,
    pub frequency: PurchaseFrequency,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub total_customers: usize,
    pub active_customers: usize,
    pub new_customers: usize,
    pub average_ticket: Decimal,
    pub frequent: usize,
    pub moderate: usize,
    pub occasional: usize,
}

#[derive(Debug, Serialize)]
pub struct CustomerReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: CustomerSummary,
    pub customers: Vec<CustomerActivity>,
}

/// Customers who bought in the range. "New" means their first purchase ever
/// falls in the range; "active" means they bought within the last month.
pub fn analyze_customers(
    rows: &[CustomerRow],
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (CustomerSummary, Vec<CustomerActivity>) {
    let customers: Vec<CustomerActivity> = rows
        .iter()
        .map(|row| {
            let interval_days = purchase_interval_days(row.first_ever, row.last_ever, row.lifetime_purchases);
            CustomerActivity {
                customer_id: row.customer_id,
                name: row.name.clone(),
                purchases: row.purchases,
                spent: row.spent,
                average_ticket: average(row.spent, row.purchases),
                last_purchase: row.last_purchase,
                days_since_last_purchase: (now - row.last_purchase).num_days(),
                interval_days,
                frequency: PurchaseFrequency::from_interval(interval_days),
            }
        })
        .collect();

    let spent: Decimal = customers.iter().map(|c| c.spent).sum();
    let purchases: i64 = customers.iter().map(|c| c.purchases).sum();
    let count = |frequency: PurchaseFrequency| customers.iter().filter(|c| c.frequency == frequency).count();

    let summary = CustomerSummary {
        total_customers: customers.len(),
        active_customers: customers
            .iter()
            .filter(|c| c.days_since_last_purchase <= ACTIVE_CUSTOMER_DAYS)
            .count(),
        new_customers: rows.iter().filter(|row| row.first_ever >= start).count(),
        average_ticket: average(spent, purchases),
        frequent: count(PurchaseFrequency::Frequent),
        moderate: count(PurchaseFrequency::Moderate),
        occasional: count(PurchaseFrequency::Occasional),
    };

    (summary, customers)
}

async fn top_products(
    db: &Database,
    limit: i64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> AppResult<Vec<TopProduct>> {
    let rows = sqlx::query_as::<_, TopProduct>(
        r#"
        SELECT p.id AS product_id, p.name, SUM(sl.quantity)::BIGINT AS quantity, SUM(sl.total) AS total
        FROM sale_line_items sl
        JOIN sales s ON s.id = sl.sale_id
        JOIN products p ON p.id = sl.product_id
        WHERE ($2::TIMESTAMPTZ IS NULL OR s.created_at >= $2)
          AND ($3::TIMESTAMPTZ IS NULL OR s.created_at <= $3)
        GROUP BY p.id, p.name
        ORDER BY quantity DESC, p.name
        LIMIT $1
        "#,
    )
    .bind(limit)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    Ok(rows)
}

pub async fn daily_sales(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<DailySales>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let today = Utc::now().date_naive();
    let first = today - Duration::days(DAILY_WINDOW_DAYS - 1);

    let rows = sqlx::query_as::<_, DailyRow>(
        r#"
        SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, COUNT(*)::BIGINT AS sales, SUM(total) AS total
        FROM sales
        WHERE created_at >= $1::DATE
        GROUP BY day
        ORDER BY day
        "#,
    )
    .bind(first)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(daily_series(&rows, first, today)))
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

pub async fn monthly_totals(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<YearQuery>,
) -> AppResult<Json<Vec<MonthlyTotals>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let bounds = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .zip(year.checked_add(1).and_then(|next| Utc.with_ymd_and_hms(next, 1, 1, 0, 0, 0).single()));
    let Some((start, end)) = bounds else {
        return Err(AppError::BadRequest(format!("year {} is out of range", year)));
    };

    let month_totals = |table: &'static str| {
        format!(
            "SELECT EXTRACT(MONTH FROM created_at)::INT AS month, SUM(total) AS total \
             FROM {} WHERE created_at >= $1 AND created_at < $2 GROUP BY 1",
            table
        )
    };

    let purchases = sqlx::query_as::<_, MonthRow>(&month_totals("purchases"))
        .bind(start)
        .bind(end)
        .fetch_all(&state.db)
        .await?;
    let sales = sqlx::query_as::<_, MonthRow>(&month_totals("sales"))
        .bind(start)
        .bind(end)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(monthly_series(&purchases, &sales)))
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

pub async fn best_sellers(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<TopQuery>,
) -> AppResult<Json<Vec<TopProduct>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let limit = query.limit.unwrap_or(DEFAULT_TOP_PRODUCTS).clamp(1, MAX_TOP_PRODUCTS);

    Ok(Json(top_products(&state.db, limit, None, None).await?))
}

pub async fn sales_by_product(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(range): Query<DateRange>,
) -> AppResult<Json<SalesByProductReport>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let (start, end) = range.resolve(Utc::now())?;

    let rows = sqlx::query_as::<_, ProductMonthRow>(
        r#"
        SELECT
            p.id AS product_id,
            p.name,
            COALESCE(c.name, '') AS category,
            to_char(date_trunc('month', s.created_at), 'YYYY-MM') AS month,
            SUM(sl.quantity)::BIGINT AS quantity,
            SUM(sl.total) AS total
        FROM sale_line_items sl
        JOIN sales s ON s.id = sl.sale_id
        JOIN products p ON p.id = sl.product_id
        LEFT JOIN categories c ON c.id = p.category_id
        WHERE s.created_at BETWEEN $1 AND $2
        GROUP BY p.id, p.name, c.name, month
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    let (summary, products) = summarize_sales_by_product(&rows);

    Ok(Json(SalesByProductReport {
        start,
        end,
        summary,
        products,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EvolutionQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grouping: Grouping,
}

pub async fn sales_evolution(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<EvolutionQuery>,
) -> AppResult<Json<SalesEvolution>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    let range = DateRange {
        start: query.start,
        end: query.end,
    };
    let (start, end) = range.resolve(Utc::now())?;

    let rows = sqlx::query_as::<_, PeriodRow>(
        r#"
        SELECT
            date_trunc($3, s.created_at) AS period,
            COUNT(*)::BIGINT AS sales,
            SUM(s.total) AS total,
            COALESCE(SUM(l.units), 0)::BIGINT AS units
        FROM sales s
        LEFT JOIN (
            SELECT sale_id, SUM(quantity) AS units FROM sale_line_items GROUP BY sale_id
        ) l ON l.sale_id = s.id
        WHERE s.created_at BETWEEN $1 AND $2
        GROUP BY period
        ORDER BY period
        "#,
    )
    .bind(start)
    .bind(end)
    .bind(query.grouping.unit())
    .fetch_all(&state.db)
    .await?;

    let summary = summarize_evolution(&rows);
    let top = top_products(&state.db, DEFAULT_TOP_PRODUCTS, Some(start), Some(end)).await?;

    Ok(Json(SalesEvolution {
        start,
        end,
        summary,
        periods: rows
            .into_iter()
            .map(|row| PeriodSales {
                period: row.period,
                sales: row.sales,
                total: row.total,
                units: row.units,
            })
            .collect(),
        top_products: top,
    }))
}

pub async fn customer_analysis(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(range): Query<DateRange>,
) -> AppResult<Json<CustomerReport>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    let now = Utc::now();
    let (start, end) = range.resolve(now)?;

    let rows = sqlx::query_as::<_, CustomerRow>(
        r#"
        SELECT
            c.id AS customer_id,
            c.name,
            COUNT(*)::BIGINT AS purchases,
            SUM(s.total) AS spent,
            MAX(s.created_at) AS last_purchase,
            h.first_ever,
            h.last_ever,
            h.lifetime_purchases
        FROM sales s
        JOIN customers c ON c.id = s.customer_id
        JOIN (
            SELECT
                customer_id,
                MIN(created_at) AS first_ever,
                MAX(created_at) AS last_ever,
                COUNT(*)::BIGINT AS lifetime_purchases
            FROM sales
            WHERE customer_id IS NOT NULL
            GROUP BY customer_id
        ) h ON h.customer_id = c.id
        WHERE s.created_at BETWEEN $1 AND $2
        GROUP BY c.id, c.name, h.first_ever, h.last_ever, h.lifetime_purchases
        ORDER BY spent DESC
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    let (summary, customers) = analyze_customers(&rows, start, now);

    Ok(Json(CustomerReport {
        start,
        end,
        summary,
        customers,
    }))
}
