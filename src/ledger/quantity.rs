use serde::Serialize;

use super::error::{LedgerError, LedgerResult};

/// How a purchase line item was bought: whole packs or loose units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PurchaseQuantity {
    Bulk { packs: i32, units_per_pack: i32 },
    Individual { units: i32 },
}

impl PurchaseQuantity {
    /// Reads the stored columns. The table keeps the two modes exclusive.
    pub fn from_columns(bulk_quantity: i32, units_per_bulk: i32, individual_quantity: i32) -> Self {
        if bulk_quantity > 0 {
            Self::Bulk {
                packs: bulk_quantity,
                units_per_pack: units_per_bulk,
            }
        } else {
            Self::Individual {
                units: individual_quantity.max(0),
            }
        }
    }

    /// Same as `from_columns` but rejects shapes that cannot be stocked.
    pub fn validated(
        product_label: &str,
        bulk_quantity: i32,
        units_per_bulk: i32,
        individual_quantity: i32,
    ) -> LedgerResult<Self> {
        if bulk_quantity < 0 || individual_quantity < 0 {
            return Err(LedgerError::validation(format!(
                "quantities cannot be negative for product {}",
                product_label
            )));
        }
        if bulk_quantity > 0 && individual_quantity > 0 {
            return Err(LedgerError::validation(format!(
                "product {} cannot be bought in packs and as loose units on the same line",
                product_label
            )));
        }
        if bulk_quantity > 0 && units_per_bulk <= 0 {
            return Err(LedgerError::validation(format!(
                "units per pack must be positive for bulk purchase of product {}",
                product_label
            )));
        }
        let quantity = Self::from_columns(bulk_quantity, units_per_bulk, individual_quantity);
        if quantity.total() == 0 {
            return Err(LedgerError::validation(format!(
                "purchased quantity must be positive for product {}",
                product_label
            )));
        }
        Ok(quantity)
    }

    pub fn total(&self) -> i64 {
        match *self {
            Self::Bulk { packs, units_per_pack } => i64::from(packs) * i64::from(units_per_pack),
            Self::Individual { units } => i64::from(units),
        }
    }

    /// Units per pack used when splitting quantities for display; loose purchases count as 1.
    pub fn pack_size(&self) -> i64 {
        match *self {
            Self::Bulk { units_per_pack, .. } if units_per_pack > 0 => i64::from(units_per_pack),
            _ => 1,
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::Bulk { .. })
    }
}

/// A unit count split into whole packs and leftover units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackBreakdown {
    pub packs: i64,
    pub units: i64,
    pub total: i64,
}

impl PackBreakdown {
    pub fn split(total: i64, pack_size: i64) -> Self {
        let size = pack_size.max(1);
        Self {
            packs: total / size,
            units: total % size,
            total,
        }
    }

    /// Loose units only, for line items bought individually.
    pub fn loose(total: i64) -> Self {
        Self {
            packs: 0,
            units: total,
            total,
        }
    }

    pub fn for_quantity(total: i64, quantity: &PurchaseQuantity) -> Self {
        if quantity.is_bulk() {
            Self::split(total, quantity.pack_size())
        } else {
            Self::loose(total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_total_multiplies_packs() {
        let q = PurchaseQuantity::from_columns(10, 10, 0);
        assert_eq!(q.total(), 100);
        assert!(q.is_bulk());
    }

    #[test]
    fn individual_ignores_pack_columns() {
        let q = PurchaseQuantity::from_columns(0, 12, 7);
        assert_eq!(q, PurchaseQuantity::Individual { units: 7 });
        assert_eq!(q.total(), 7);
        assert_eq!(q.pack_size(), 1);
    }

    #[test]
    fn bulk_without_pack_size_is_rejected() {
        let err = PurchaseQuantity::validated("P-1", 5, 0, 0).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(msg) if msg.contains("P-1")));
    }

    #[test]
    fn mixed_packs_and_units_are_rejected() {
        let err = PurchaseQuantity::validated("P-1", 2, 6, 4).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(msg) if msg.contains("P-1")));
        assert!(PurchaseQuantity::validated("P-1", 2, 6, 0).is_ok());
        assert!(PurchaseQuantity::validated("P-1", 0, 6, 4).is_ok());
    }

    #[test]
    fn empty_purchase_is_rejected() {
        assert!(PurchaseQuantity::validated("P-1", 0, 0, 0).is_err());
        assert!(PurchaseQuantity::validated("P-1", 0, 0, -3).is_err());
    }

    #[test]
    fn breakdown_splits_into_packs() {
        let q = PurchaseQuantity::from_columns(4, 12, 0);
        assert_eq!(
            PackBreakdown::for_quantity(30, &q),
            PackBreakdown { packs: 2, units: 6, total: 30 }
        );
        let loose = PurchaseQuantity::from_columns(0, 0, 30);
        assert_eq!(
            PackBreakdown::for_quantity(30, &loose),
            PackBreakdown { packs: 0, units: 30, total: 30 }
        );
    }
}
