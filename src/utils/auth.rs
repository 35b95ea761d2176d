use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{Duration, Utc};

use crate::models::Role;

pub const AUTH_COOKIE: &str = "auth_token";
pub const TOKEN_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: String, role: Role) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(TOKEN_HOURS);

        Self {
            sub: user_id.to_string(),
            email,
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn create_token(secret: &str, user_id: Uuid, email: String, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::new(user_id, email, role);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_with_the_same_secret() {
        let id = Uuid::new_v4();
        let token = create_token("s3cret", id, "ana@tienda.bo".to_string(), Role::Warehouse).unwrap();
        let claims = verify_token("s3cret", &token).unwrap();

        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.role, Role::Warehouse);
        assert_eq!(claims.exp - claims.iat, TOKEN_HOURS * 3600);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = create_token("one", Uuid::new_v4(), "x@y.z".to_string(), Role::Admin).unwrap();
        assert!(verify_token("two", &token).is_err());
    }
}
