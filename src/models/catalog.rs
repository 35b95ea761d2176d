use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct UnitOfMeasure {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A catalog product. `current_stock` is the live counter; `reorder_threshold`
/// is the level below which the warehouse report raises a reorder alert.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sale_price: Decimal,
    pub current_stock: i32,
    pub reorder_threshold: i32,
    pub unit_of_measure_id: i32,
    pub category_id: Uuid,
    pub supplier_id: Uuid,
    pub has_barcode: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProductListing {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sale_price: Decimal,
    pub current_stock: i32,
    pub reorder_threshold: i32,
    pub category_name: String,
    pub supplier_name: String,
    pub unit_name: String,
    pub has_barcode: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub name: String,
    pub description: Option<String>,
    pub sale_price: Decimal,
    #[serde(default)]
    pub reorder_threshold: i32,
    pub unit_of_measure_id: i32,
    pub category_id: Uuid,
    pub supplier_id: Uuid,
    #[serde(default)]
    pub has_barcode: bool,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SupplierPayload {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}
