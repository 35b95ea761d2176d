use axum::{
    extract::{FromRequest, Form, Json, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use askama::Template;
use serde::Deserialize;
use tower_cookies::{Cookie, Cookies};

use crate::{
    database::Database,
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::{User, UserResponse},
    state::AppState,
    utils::{create_token, verify_password, AUTH_COOKIE, TOKEN_HOURS},
};

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    error: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

pub async fn login_page() -> LoginTemplate {
    LoginTemplate { error: String::new() }
}

/// Accepts credentials as JSON or as a urlencoded form. JSON callers get the
/// user back; form callers are redirected to the warehouse report.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
) -> AppResult<Response> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("application/json"));

    let credentials = if is_json {
        Json::<LoginForm>::from_request(request, &state)
            .await
            .map(|Json(form)| form)
            .map_err(|e| AppError::BadRequest(e.body_text()))?
    } else {
        Form::<LoginForm>::from_request(request, &state)
            .await
            .map(|Form(form)| form)
            .map_err(|e| AppError::BadRequest(e.body_text()))?
    };

    let user = match authenticate_user(&state.db, &credentials.email, &credentials.password).await? {
        Some(user) => user,
        None if is_json => return Err(AppError::Unauthorized),
        None => {
            let page = LoginTemplate {
                error: "Correo o contraseña incorrectos".to_string(),
            };
            return Ok((StatusCode::UNAUTHORIZED, Html(page.render()?)).into_response());
        }
    };

    let current = CurrentUser::from_user(user.clone()).ok_or(AppError::Forbidden)?;
    let token = create_token(&state.config.jwt_secret, current.id, current.email.clone(), current.role)
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))?;

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let cookie = Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(TOKEN_HOURS))
        .build();
    cookies.add(cookie);

    log::info!("User {} signed in as {}", user.id, current.role.as_str());

    if is_json {
        Ok(Json(UserResponse::from(user)).into_response())
    } else {
        Ok(Redirect::to("/reports/warehouse").into_response())
    }
}

pub async fn logout(cookies: Cookies) -> impl IntoResponse {
    cookies.remove(Cookie::build((AUTH_COOKIE, "")).path("/").build());
    Redirect::to("/login")
}

async fn authenticate_user(db: &Database, email: &str, password: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND is_active = true"
    )
    .bind(email.trim())
    .fetch_optional(db)
    .await?;

    Ok(user.filter(|u| verify_password(password, &u.password_hash).unwrap_or(false)))
}
