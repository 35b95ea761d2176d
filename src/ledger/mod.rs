//! Lot ledger: lot planning at purchase time, movement booking at the
//! warehouse, and the stock projections every report reads.
//!
//! Nothing in here touches the database. The services load rows, hand them
//! to these functions, and write back whatever they decide.

pub mod batch;
pub mod error;
pub mod expiry;
pub mod movement;
pub mod quantity;
pub mod reconcile;

pub use batch::{plan_lots, LotEntry, PlannedLot};
pub use error::LedgerError;
pub use expiry::{ExpiryDatePolicy, ExpiryStatus, DEFAULT_NEAR_EXPIRY_DAYS};
pub use movement::{
    allocate_movement, resolve_unit_of_measure, Allocation, LotSelectionPolicy, MovementQuantity,
    MovementType,
};
pub use quantity::{PackBreakdown, PurchaseQuantity};
pub use reconcile::{
    detect_drift, flow_by_lot, ledger_flow, lot_balance, reconcile_line_item, summarize_product,
    ExpiryCounts, LineItemBalance, LotBalance, LotRecord, MovementRecord, ProductStockSummary,
    StockDrift, StockOverview,
};

/// Knobs the ledger needs from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub default_unit_of_measure_id: i32,
    pub near_expiry_days: i64,
    pub lot_selection: LotSelectionPolicy,
    pub expiry_dates: ExpiryDatePolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_unit_of_measure_id: 2,
            near_expiry_days: DEFAULT_NEAR_EXPIRY_DAYS,
            lot_selection: LotSelectionPolicy::CreatedOrder,
            expiry_dates: ExpiryDatePolicy::Lenient,
        }
    }
}
