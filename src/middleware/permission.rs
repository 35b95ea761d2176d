use serde::Serialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Role, User},
    state::AppState,
    utils::{verify_token, AUTH_COOKIE},
};

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn from_user(user: User) -> Option<Self> {
        let role = Role::parse(&user.role)?;
        Some(Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Admins pass every gate.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.role == Role::Admin || roles.contains(&self.role)
    }

    pub fn require(&self, roles: &[Role]) -> AppResult<()> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            log::warn!("User {} ({}) denied; needs one of {:?}", self.id, self.role.as_str(), roles);
            Err(AppError::Forbidden)
        }
    }
}

/// Resolves the signed-in user from the `auth_token` cookie.
/// The user must still exist and be active; the role is read from the database.
pub async fn get_current_user(cookies: &Cookies, state: &AppState) -> AppResult<CurrentUser> {
    let token = cookies
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(&state.config.jwt_secret, &token).map_err(|e| {
        log::debug!("Rejected auth token: {}", e);
        AppError::Unauthorized
    })?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE id = $1 AND is_active = true"
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    CurrentUser::from_user(user).ok_or(AppError::Unauthorized)
}
