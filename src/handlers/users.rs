use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::get_current_user,
    models::{CreateUser, Role, UpdateUser, User, UserResponse},
    state::AppState,
    utils::hash_password,
};

const MIN_PASSWORD_LEN: usize = 6;

fn hash(password: &str) -> AppResult<String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    hash_password(password).map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

fn duplicate_email(err: sqlx::Error, email: &str) -> AppError {
    AppError::from_unique_violation(err, format!("an active employee already uses {}", email))
}

pub async fn list_users(
    State(state): State<AppState>,
    cookies: Cookies,
) -> AppResult<Json<Vec<UserResponse>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Admin])?;

    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE is_active = true ORDER BY first_name, last_name"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let current = get_current_user(&cookies, &state).await?;
    current.require(&[Role::Admin])?;

    let email = payload.email.trim().to_lowercase();
    let password_hash = hash(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, phone, role, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&payload.phone)
    .bind(payload.role.as_str())
    .bind(current.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| duplicate_email(e, &email))?;

    log::info!("Employee {} created as {} by {}", user.id, user.role, current.id);

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUser>,
) -> AppResult<Json<UserResponse>> {
    let current = get_current_user(&cookies, &state).await?;
    current.require(&[Role::Admin])?;

    let email = payload.email.trim().to_lowercase();
    let password_hash = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash(password)?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET email = $1, first_name = $2, last_name = $3, phone = $4, role = $5,
            password_hash = COALESCE($6, password_hash), updated_at = NOW()
        WHERE id = $7 AND is_active = true
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&payload.phone)
    .bind(payload.role.as_str())
    .bind(password_hash)
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| duplicate_email(e, &email))?
    .ok_or_else(|| AppError::NotFound(format!("employee {}", id)))?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let current = get_current_user(&cookies, &state).await?;
    current.require(&[Role::Admin])?;

    if current.id == id {
        return Err(AppError::BadRequest("you cannot deactivate your own account".to_string()));
    }

    let result = sqlx::query("UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1 AND is_active = true")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("employee {}", id)));
    }

    log::info!("Employee {} deactivated by {}", id, current.id);
    Ok(StatusCode::NO_CONTENT)
}
