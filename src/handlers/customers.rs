use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, AppResult},
    middleware::get_current_user,
    models::{Customer, CustomerPayload, Role},
    state::AppState,
};

pub async fn list_customers(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<Customer>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let customers = sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(customers))
}

pub async fn create_customer(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CustomerPayload>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let document = payload.document_number.trim();
    if document.is_empty() || payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("document number and name are required".to_string()));
    }

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (document_number, name, email, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(document)
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(user.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_unique_violation(e, format!("a customer with document {} already exists", document)))?;

    log::info!("Customer {} registered by {}", customer.id, user.id);

    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn find_by_document(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(document): Path<String>,
) -> AppResult<Json<Customer>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE document_number = $1")
        .bind(document.trim())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("customer with document {}", document)))?;

    Ok(Json(customer))
}
