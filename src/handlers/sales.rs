use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, AppResult},
    middleware::get_current_user,
    models::{CreateSale, ProductUnit, Role, SaleDisplay},
    services::sales,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Missing bounds default to the last month up to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.end.unwrap_or(now);
        let start = self.start.unwrap_or(end - Duration::days(30));
        if start > end {
            return Err(AppError::BadRequest("start must not be after end".to_string()));
        }
        Ok((start, end))
    }
}

pub async fn create_sale(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<CreateSale>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let sale = sales::create_sale(&state.db, state.config.anonymous_customer_id, user.id, payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "id": sale.id, "total": sale.total }))))
}

pub async fn list_sales(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(range): Query<DateRange>,
) -> AppResult<Json<Vec<SaleDisplay>>> {
    let user = get_current_user(&cookies, &state).await?;
    user.require(&[Role::Seller])?;

    let (start, end) = range.resolve(Utc::now())?;

    Ok(Json(sales::list_sales(&state.db, start, end).await?))
}

pub async fn find_barcode(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(code): Path<String>,
) -> AppResult<Json<ProductUnit>> {
    get_current_user(&cookies, &state).await?;

    Ok(Json(sales::find_barcode_unit(&state.db, &code).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_range_defaults_to_last_month() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let (start, end) = DateRange { start: None, end: None }.resolve(now).unwrap();
        assert_eq!(end, now);
        assert_eq!(start, now - Duration::days(30));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let now = Utc::now();
        let range = DateRange {
            start: Some(now),
            end: Some(now - Duration::days(1)),
        };
        assert!(matches!(range.resolve(now), Err(AppError::BadRequest(_))));
    }
}
