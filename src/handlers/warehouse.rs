use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppResult,
    ledger::LotBalance,
    middleware::get_current_user,
    models::{IntakeRecord, Lot, MovementPayload, ReceivePayload, Role, WarehouseMovement},
    services::warehouse::{self, IntakeReceipt, MovementReceipt},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct MovementQuery {
    pub line_item_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LotStatusPayload {
    pub is_active: bool,
}

pub async fn receive(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<ReceivePayload>,
) -> AppResult<(StatusCode, Json<IntakeReceipt>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let receipt = warehouse::receive_into_warehouse(&state.db, state.ledger(), user.id, payload).await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_intake(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<IntakeRecord>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    Ok(Json(warehouse::list_intake_records(&state.db).await?))
}

pub async fn record_movement(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<MovementPayload>,
) -> AppResult<(StatusCode, Json<MovementReceipt>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    let receipt = warehouse::record_movement(&state.db, state.ledger(), user.id, payload).await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_movements(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<MovementQuery>,
) -> AppResult<Json<Vec<WarehouseMovement>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Warehouse])?;

    Ok(Json(warehouse::list_movements(&state.db, query.line_item_id).await?))
}

pub async fn product_lots(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<LotBalance>>> {
    get_current_user(&cookies, &state).await?;

    let lots = warehouse::product_lots(&state.db, state.ledger(), product_id, Utc::now()).await?;

    Ok(Json(lots))
}

pub async fn set_lot_status(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(lot_id): Path<Uuid>,
    Json(payload): Json<LotStatusPayload>,
) -> AppResult<Json<Lot>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    Ok(Json(warehouse::set_lot_active(&state.db, lot_id, payload.is_active).await?))
}
