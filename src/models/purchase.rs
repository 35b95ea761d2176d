use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::ledger::{LotEntry, LotRecord, MovementRecord, MovementType, PurchaseQuantity};

pub const LINE_PENDING: i16 = 0;
pub const LINE_RECEIVED: i16 = 1;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct PurchaseLineItem {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub product_id: Uuid,
    pub bulk_quantity: i32,
    pub bulk_unit_price: Decimal,
    pub units_per_bulk: i32,
    pub bulk_unit_of_measure_id: Option<i32>,
    pub individual_quantity: i32,
    pub unit_price: Decimal,
    pub bulk_discount: Decimal,
    pub individual_discount: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: i16,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseLineItem {
    pub fn quantity(&self) -> PurchaseQuantity {
        PurchaseQuantity::from_columns(self.bulk_quantity, self.units_per_bulk, self.individual_quantity)
    }

    pub fn is_received(&self) -> bool {
        self.status == LINE_RECEIVED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lot {
    pub id: Uuid,
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub lot_number: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_quantity: i32,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Lot> for LotRecord {
    fn from(lot: &Lot) -> Self {
        Self {
            id: lot.id,
            lot_number: lot.lot_number.clone(),
            expires_at: lot.expires_at,
            initial_quantity: lot.initial_quantity,
            is_active: lot.is_active,
            created_at: lot.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct IntakeRecord {
    pub id: Uuid,
    pub line_item_id: Uuid,
    pub quantity: i32,
    pub received_by: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WarehouseMovement {
    pub id: Uuid,
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub lot_id: Option<Uuid>,
    pub packs: i32,
    pub units: i32,
    pub total_quantity: i32,
    pub movement_type: i16,
    pub unit_of_measure_id: i32,
    pub recorded_by: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl WarehouseMovement {
    pub fn kind(&self) -> MovementType {
        MovementType::from_code(self.movement_type).unwrap_or_else(|| {
            log::warn!(
                "Movement {} has unknown type code {}, read as egress",
                self.id,
                self.movement_type
            );
            MovementType::Egress
        })
    }
}

impl From<&WarehouseMovement> for MovementRecord {
    fn from(movement: &WarehouseMovement) -> Self {
        Self {
            id: movement.id,
            lot_id: movement.lot_id,
            total_quantity: movement.total_quantity,
            movement_type: movement.kind(),
            recorded_at: movement.recorded_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseTotals {
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLinePayload {
    pub product_id: Uuid,
    #[serde(default)]
    pub bulk_quantity: i32,
    #[serde(default)]
    pub bulk_unit_price: Decimal,
    #[serde(default)]
    pub units_per_bulk: i32,
    pub bulk_unit_of_measure_id: Option<i32>,
    #[serde(default)]
    pub individual_quantity: i32,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub bulk_discount: Decimal,
    #[serde(default)]
    pub individual_discount: Decimal,
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub lots: Vec<LotEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchase {
    pub purchase: PurchaseTotals,
    pub lines: Vec<PurchaseLinePayload>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivePayload {
    pub line_item_id: Uuid,
    #[serde(default)]
    pub packs: i32,
    #[serde(default)]
    pub units: i32,
    pub lot_id: Option<Uuid>,
    #[serde(default)]
    pub barcodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovementPayload {
    pub line_item_id: Uuid,
    #[serde(default)]
    pub packs: i32,
    #[serde(default)]
    pub units: i32,
    pub movement_type: MovementType,
    pub unit_of_measure_id: Option<i32>,
    pub lot_id: Option<Uuid>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(code: i16) -> WarehouseMovement {
        WarehouseMovement {
            id: Uuid::new_v4(),
            line_item_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            lot_id: None,
            packs: 0,
            units: 3,
            total_quantity: 3,
            movement_type: code,
            unit_of_measure_id: 2,
            recorded_by: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn movement_kind_reads_type_code() {
        assert_eq!(movement(1).kind(), MovementType::Intake);
        assert_eq!(movement(2).kind(), MovementType::Egress);
        assert_eq!(movement(9).kind(), MovementType::Egress);
    }

    #[test]
    fn stored_columns_keep_purchase_mode() {
        let mut line = PurchaseLineItem {
            id: Uuid::new_v4(),
            purchase_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            bulk_quantity: 4,
            bulk_unit_price: Decimal::ONE,
            units_per_bulk: 6,
            bulk_unit_of_measure_id: Some(1),
            individual_quantity: 0,
            unit_price: Decimal::ZERO,
            bulk_discount: Decimal::ZERO,
            individual_discount: Decimal::ZERO,
            subtotal: Decimal::from(4),
            discount: Decimal::ZERO,
            total: Decimal::from(4),
            status: LINE_PENDING,
            created_by: None,
            created_at: Utc::now(),
        };
        assert_eq!(line.quantity(), PurchaseQuantity::Bulk { packs: 4, units_per_pack: 6 });
        assert!(!line.is_received());

        line.status = LINE_RECEIVED;
        assert!(line.is_received());
    }
}
