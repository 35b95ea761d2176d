mod config;
mod database;
mod error;
mod filters;
mod handlers;
mod ledger;
mod middleware;
mod models;
mod services;
mod state;
mod utils;

use axum::{
    response::Redirect,
    routing::{get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use dotenvy::dotenv;

use config::AppConfig;
use database::create_database_pool;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let db = create_database_pool(&config.database_url).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    log::info!(
        "Lot selection {:?}, near-expiry window {} days, default unit {}",
        config.ledger.lot_selection,
        config.ledger.near_expiry_days,
        config.ledger.default_unit_of_measure_id
    );

    let app = create_router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Tienda listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::permanent("/reports/warehouse") }))
        .route("/login", get(handlers::auth::login_page).post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))

        // Catalog
        .route("/api/products", get(handlers::products::list_products).post(handlers::products::create_product))
        .route("/api/products/name-available", get(handlers::products::name_available))
        .route(
            "/api/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::deactivate_product),
        )
        .route("/api/products/:id/lots", get(handlers::warehouse::product_lots))
        .route("/api/categories", get(handlers::products::list_categories).post(handlers::products::create_category))
        .route("/api/suppliers", get(handlers::products::list_suppliers).post(handlers::products::create_supplier))
        .route("/api/units", get(handlers::products::list_units))

        // Purchasing
        .route("/api/purchases", get(handlers::purchases::purchase_history).post(handlers::purchases::create_purchase))
        .route("/api/purchases/pending-lines", get(handlers::purchases::pending_lines))

        // Warehouse
        .route("/api/warehouse/intake", get(handlers::warehouse::list_intake).post(handlers::warehouse::receive))
        .route("/api/warehouse/movements", get(handlers::warehouse::list_movements).post(handlers::warehouse::record_movement))
        .route("/api/lots/:id/status", patch(handlers::warehouse::set_lot_status))

        // Sales
        .route("/api/sales", get(handlers::sales::list_sales).post(handlers::sales::create_sale))
        .route("/api/barcodes/:code", get(handlers::sales::find_barcode))

        // Customers and employees
        .route("/api/customers", get(handlers::customers::list_customers).post(handlers::customers::create_customer))
        .route("/api/customers/by-document/:document", get(handlers::customers::find_by_document))
        .route("/api/users", get(handlers::users::list_users).post(handlers::users::create_user))
        .route("/api/users/:id", put(handlers::users::update_user).delete(handlers::users::deactivate_user))

        // Reports
        .route("/api/reports/warehouse", get(handlers::reports::warehouse_json))
        .route("/reports/warehouse", get(handlers::reports::warehouse_page))
        .route("/api/reports/movements", get(handlers::reports::movements_report))
        .route("/api/reports/history", get(handlers::reports::warehouse_history))
        .route("/api/reports/stock-drift", get(handlers::reports::stock_drift))
        .route("/api/reports/sales-by-product", get(handlers::sales_reports::sales_by_product))
        .route("/api/reports/sales-evolution", get(handlers::sales_reports::sales_evolution))
        .route("/api/reports/customers", get(handlers::sales_reports::customer_analysis))

        // Dashboard
        .route("/api/dashboard/daily-sales", get(handlers::sales_reports::daily_sales))
        .route("/api/dashboard/monthly", get(handlers::sales_reports::monthly_totals))
        .route("/api/dashboard/top-products", get(handlers::sales_reports::best_sellers))

        .nest_service("/static", ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
        )
        .with_state(state)
}
