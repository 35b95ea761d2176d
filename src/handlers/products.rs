use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::get_current_user,
    models::{
        Category, CategoryPayload, Product, ProductListing, ProductPayload, Role, Supplier,
        SupplierPayload, UnitOfMeasure,
    },
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    #[serde(default)]
    pub for_sale: bool,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductListing>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
    pub exclude: Option<Uuid>,
}

fn push_product_filters(query: &mut QueryBuilder<'_, Postgres>, params: &ProductQuery) {
    query.push(" WHERE p.is_active = TRUE");
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        query.push(" AND p.name ILIKE ").push_bind(format!("%{}%", search));
    }
    if params.for_sale {
        query.push(" AND p.current_stock > 0");
    }
}

pub async fn list_products(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<ProductQuery>,
) -> AppResult<Json<ProductPage>> {
    get_current_user(&cookies, &state).await?;

    let take = params.take.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let skip = params.skip.unwrap_or(0).max(0);

    let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_product_filters(&mut count, &params);
    let total = count.build_query_scalar::<i64>().fetch_one(&state.db).await?;

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT p.id, p.name, p.description, p.sale_price, p.current_stock, p.reorder_threshold,
               c.name AS category_name, s.name AS supplier_name, u.name AS unit_name, p.has_barcode
        FROM products p
        JOIN categories c ON c.id = p.category_id
        JOIN suppliers s ON s.id = p.supplier_id
        JOIN units_of_measure u ON u.id = p.unit_of_measure_id
        "#,
    );
    push_product_filters(&mut query, &params);
    query.push(" ORDER BY p.name OFFSET ").push_bind(skip);
    query.push(" LIMIT ").push_bind(take);

    let items = query.build_query_as::<ProductListing>().fetch_all(&state.db).await?;

    Ok(Json(ProductPage { items, total }))
}

pub async fn get_product(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    get_current_user(&cookies, &state).await?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;

    Ok(Json(product))
}

fn validate_product(payload: &ProductPayload) -> AppResult<()> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("product name is required".to_string()));
    }
    if payload.sale_price.is_sign_negative() {
        return Err(AppError::BadRequest("sale price cannot be negative".to_string()));
    }
    if payload.reorder_threshold < 0 {
        return Err(AppError::BadRequest("reorder threshold cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn create_product(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<ProductPayload>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;
    validate_product(&payload)?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (
            name, description, sale_price, reorder_threshold, unit_of_measure_id,
            category_id, supplier_id, has_barcode, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.sale_price)
    .bind(payload.reorder_threshold)
    .bind(payload.unit_of_measure_id)
    .bind(payload.category_id)
    .bind(payload.supplier_id)
    .bind(payload.has_barcode)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    log::info!("Product {} ({}) created by {}", product.id, product.name, user.id);

    Ok((StatusCode::CREATED, Json(product)))
}

/// Updates catalog fields. The stock counter is only moved by the warehouse and sales.
pub async fn update_product(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductPayload>,
) -> AppResult<Json<Product>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;
    validate_product(&payload)?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = $1, description = $2, sale_price = $3, reorder_threshold = $4,
            unit_of_measure_id = $5, category_id = $6, supplier_id = $7, has_barcode = $8,
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.sale_price)
    .bind(payload.reorder_threshold)
    .bind(payload.unit_of_measure_id)
    .bind(payload.category_id)
    .bind(payload.supplier_id)
    .bind(payload.has_barcode)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;

    Ok(Json(product))
}

pub async fn deactivate_product(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    let result = sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("product {}", id)));
    }

    log::info!("Product {} deactivated by {}", id, user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn name_available(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<NameQuery>,
) -> AppResult<Json<serde_json::Value>> {
    get_current_user(&cookies, &state).await?;

    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM products
            WHERE LOWER(name) = LOWER($1) AND is_active AND ($2::UUID IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(params.name.trim())
    .bind(params.exclude)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(serde_json::json!({ "available": !taken })))
}

pub async fn list_categories(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<Category>>> {
    get_current_user(&cookies, &state).await?;

    let categories = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE is_active ORDER BY name"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CategoryPayload>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("category name is required".to_string()));
    }

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name) VALUES ($1) RETURNING *"
    )
    .bind(name)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_unique_violation(e, format!("category {} already exists", name)))?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<Supplier>>> {
    get_current_user(&cookies, &state).await?;

    let suppliers = sqlx::query_as::<_, Supplier>(
        "SELECT * FROM suppliers WHERE is_active ORDER BY name"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(suppliers))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SupplierPayload>,
) -> AppResult<(StatusCode, Json<Supplier>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("supplier name is required".to_string()));
    }

    let supplier = sqlx::query_as::<_, Supplier>(
        "INSERT INTO suppliers (name, phone, email) VALUES ($1, $2, $3) RETURNING *"
    )
    .bind(payload.name.trim())
    .bind(&payload.phone)
    .bind(&payload.email)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn list_units(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<UnitOfMeasure>>> {
    get_current_user(&cookies, &state).await?;

    let units = sqlx::query_as::<_, UnitOfMeasure>("SELECT * FROM units_of_measure ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(units))
}
