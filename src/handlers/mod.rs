pub mod auth;
pub mod customers;
pub mod products;
pub mod purchases;
pub mod reports;
pub mod sales;
pub mod sales_reports;
pub mod users;
pub mod warehouse;
