//! One-shot password validation endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use warden_common::ValidationSnapshot;

use crate::cancel::CancelToken;
use crate::fingerprint::Fingerprint;
use crate::state::Services;
use crate::validation::{UserContext, evaluate};

/// Request body. Deliberately not `Debug`: it carries the raw password.
#[derive(Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    password: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    error: &'static str,
}

/// Validate a password against local requirements and the breach corpus
///
/// Returns:
/// - 200: Valid (breach check passed, or could not be confirmed)
/// - 400: Missing or empty password
/// - 422: One or more requirements failed
pub async fn validate_password(
    State(services): State<Services>,
    Json(request): Json<ValidateRequest>,
) -> Result<(StatusCode, Json<ValidationSnapshot>), (StatusCode, Json<ErrorResponse>)> {
    if request.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Password is required",
            }),
        ));
    }

    let user = UserContext::new(request.username, request.email);
    let snapshot = evaluate(
        &services.client,
        &request.password,
        &user,
        &CancelToken::new(),
    )
    .await;

    tracing::debug!(
        fingerprint = %Fingerprint::of(&request.password),
        valid = snapshot.is_valid,
        hibp = ?snapshot.hibp,
        fallback = snapshot.fallback_applied,
        "Password validated"
    );

    let status = if snapshot.is_valid {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(snapshot)))
}
