use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use playerdex_core::{StoreError, ValidationError};

use crate::auth::AccessDenied;

const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected error occurred while processing your request.";

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::ProfileAlreadyExists => {
            json_error(StatusCode::CONFLICT, "profile_already_exists", err.to_string())
        }
        StoreError::GamerTagInUse => {
            json_error(StatusCode::CONFLICT, "gamer_tag_in_use", err.to_string())
        }
        StoreError::AlreadyReferred => {
            json_error(StatusCode::CONFLICT, "already_referred", err.to_string())
        }
        StoreError::SelfReferral => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "self_referral", err.to_string())
        }
        StoreError::ReferrerNotFound => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "referrer_not_found",
            err.to_string(),
        ),
        StoreError::ProfileNotFound => {
            json_error(StatusCode::NOT_FOUND, "profile_not_found", err.to_string())
        }
        StoreError::Internal(detail) => {
            // Log the detail, never leak it.
            error!(error = %detail, "internal failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                INTERNAL_ERROR_MESSAGE,
            )
        }
    }
}

pub fn unauthorized(denied: AccessDenied) -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", denied.to_string())
}

pub fn validation_error(violations: Vec<ValidationError>) -> axum::response::Response {
    let fields: Vec<_> = violations
        .iter()
        .map(|v| json!({ "field": v.field, "description": v.reason }))
        .collect();

    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "invalid_parameters",
            "message": "invalid parameters",
            "field_violations": fields,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
