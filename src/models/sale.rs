use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub document_number: String,
    pub name: String,
    pub email: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerPayload {
    pub document_number: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Sale {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub amount_received: Decimal,
    pub change_given: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Sale row joined with customer and seller names for the history view.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SaleDisplay {
    pub id: Uuid,
    pub customer_name: String,
    pub seller_name: String,
    pub total: Decimal,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A barcoded unit registered at intake; sold units become unavailable.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProductUnit {
    pub id: Uuid,
    pub product_id: Uuid,
    pub lot_id: Option<Uuid>,
    pub barcode: String,
    pub quantity: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SaleTotals {
    pub customer_id: Option<Uuid>,
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub amount_received: Decimal,
    #[serde(default)]
    pub change_given: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SaleLinePayload {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub barcode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSale {
    pub sale: SaleTotals,
    pub lines: Vec<SaleLinePayload>,
}
