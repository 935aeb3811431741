use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use playerdex_core::validate_wallet_address;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:wallet_address/referrer", get(get_referrer))
        .route("/:wallet_address/referrals", get(list_referrals))
}

pub async fn get_referrer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(wallet_address): Path<String>,
) -> axum::response::Response {
    if let Err(v) = validate_wallet_address(&wallet_address) {
        return errors::validation_error(vec![v]);
    }

    match services.profiles.store().get_referrer(&wallet_address).await {
        Ok(referral) => (
            StatusCode::OK,
            Json(dto::ReferrerResponse {
                referral: referral.map(dto::ReferralBody::from),
            }),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_referrals(
    Extension(services): Extension<Arc<AppServices>>,
    Path(wallet_address): Path<String>,
    Query(query): Query<dto::PageQuery>,
) -> axum::response::Response {
    if let Err(v) = validate_wallet_address(&wallet_address) {
        return errors::validation_error(vec![v]);
    }

    let (page, page_size) = query.normalize();
    let (limit, offset) = query.limit_offset();
    let store = services.profiles.store();

    let referrals = match store.list_referrals(&wallet_address, limit, offset).await {
        Ok(referrals) => referrals,
        Err(e) => return errors::store_error_to_response(e),
    };

    let total_referrals = match store.count_referrals(&wallet_address).await {
        Ok(total) => total,
        Err(e) => return errors::store_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(dto::ListReferralsResponse {
            page,
            page_size,
            total_referrals,
            referrals: referrals.into_iter().map(dto::ReferralBody::from).collect(),
        }),
    )
        .into_response()
}
