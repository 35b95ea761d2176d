pub mod catalog;
pub mod purchase;
pub mod sale;
pub mod user;

pub use catalog::{
    Category, CategoryPayload, Product, ProductListing, ProductPayload, Supplier, SupplierPayload,
    UnitOfMeasure,
};
pub use purchase::{
    CreatePurchase, IntakeRecord, Lot, MovementPayload, Purchase, PurchaseLineItem, PurchaseLinePayload,
    ReceivePayload, WarehouseMovement, LINE_PENDING, LINE_RECEIVED,
};
pub use sale::{CreateSale, Customer, CustomerPayload, ProductUnit, Sale, SaleDisplay};
pub use user::{CreateUser, Role, UpdateUser, User, UserResponse};
