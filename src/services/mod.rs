pub mod purchases;
pub mod sales;
pub mod stock;
pub mod warehouse;
