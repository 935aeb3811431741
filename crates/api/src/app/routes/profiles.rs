use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    routing::post,
    Json, Router,
};

use playerdex_core::{validate_gamer_tag, validate_wallet_address, ValidationError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::auth;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_profile).get(list_profiles))
        .route(
            "/:wallet_address",
            get(get_profile).patch(update_profile).delete(delete_profile),
        )
}

pub async fn create_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateProfileRequest>,
) -> axum::response::Response {
    let mut violations = Vec::new();
    if let Err(v) = validate_wallet_address(&body.wallet_address) {
        violations.push(v);
    }
    if let Err(v) = validate_gamer_tag(&body.gamer_tag) {
        violations.push(v);
    }
    if let Some(referrer) = &body.referrer {
        if let Err(v) = validate_wallet_address(referrer) {
            violations.push(ValidationError {
                field: "referrer",
                reason: v.reason,
            });
        }
    }
    if !violations.is_empty() {
        return errors::validation_error(violations);
    }

    if let Err(denied) =
        auth::authorize_user(services.verifier.as_ref(), &headers, &body.wallet_address).await
    {
        return errors::unauthorized(denied);
    }

    match services
        .profiles
        .create_profile_with_referral(&body.wallet_address, &body.gamer_tag, body.referrer.as_deref())
        .await
    {
        Ok((profile, referral)) => (
            StatusCode::CREATED,
            Json(dto::CreateProfileResponse {
                // Enrichment runs out-of-band; the name starts empty.
                profile: dto::ProfileBody::new(profile, String::new()),
                referral: referral.map(dto::ReferralBody::from),
            }),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(wallet_address): Path<String>,
) -> axum::response::Response {
    if let Err(v) = validate_wallet_address(&wallet_address) {
        return errors::validation_error(vec![v]);
    }

    if let Err(denied) =
        auth::authorize_user(services.verifier.as_ref(), &headers, &wallet_address).await
    {
        return errors::unauthorized(denied);
    }

    match services
        .profiles
        .get_profile_with_enrichment(&wallet_address)
        .await
    {
        Ok(enriched) => (
            StatusCode::OK,
            Json(dto::ProfileResponse {
                profile: enriched.into(),
            }),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(wallet_address): Path<String>,
    Json(body): Json<dto::UpdateProfileRequest>,
) -> axum::response::Response {
    let mut violations = Vec::new();
    if let Err(v) = validate_wallet_address(&wallet_address) {
        violations.push(v);
    }
    if let Some(gamer_tag) = &body.gamer_tag {
        if let Err(v) = validate_gamer_tag(gamer_tag) {
            violations.push(v);
        }
    }
    if !violations.is_empty() {
        return errors::validation_error(violations);
    }

    if let Err(denied) =
        auth::authorize_user(services.verifier.as_ref(), &headers, &wallet_address).await
    {
        return errors::unauthorized(denied);
    }

    match services
        .profiles
        .update_profile_with_enrichment(&wallet_address, body.gamer_tag.as_deref())
        .await
    {
        Ok(enriched) => (
            StatusCode::OK,
            Json(dto::ProfileResponse {
                profile: enriched.into(),
            }),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(wallet_address): Path<String>,
) -> axum::response::Response {
    if let Err(v) = validate_wallet_address(&wallet_address) {
        return errors::validation_error(vec![v]);
    }

    if let Err(denied) =
        auth::authorize_user(services.verifier.as_ref(), &headers, &wallet_address).await
    {
        return errors::unauthorized(denied);
    }

    match services.profiles.store().delete_profile(&wallet_address).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_profiles(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::PageQuery>,
) -> axum::response::Response {
    let (page, page_size) = query.normalize();
    let (limit, offset) = query.limit_offset();

    let profiles = match services
        .profiles
        .list_profiles_with_enrichment(limit, offset)
        .await
    {
        Ok(profiles) => profiles,
        Err(e) => return errors::store_error_to_response(e),
    };

    let total_profiles = match services.profiles.store().count_profiles().await {
        Ok(total) => total,
        Err(e) => return errors::store_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(dto::ListProfilesResponse {
            page,
            page_size,
            total_profiles,
            profiles: profiles.into_iter().map(dto::ProfileBody::from).collect(),
        }),
    )
        .into_response()
}
