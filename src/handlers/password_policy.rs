use axum::{Json, extract::State};
use garde::Validate;
use serde::{Deserialize, Serialize};

use super::validate_request;
use crate::error::AppError;
use crate::services::{PasswordValidationResult, UserContext};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidatePasswordRequest {
    #[garde(length(min = 1))]
    pub password: String,
    #[garde(skip)]
    pub user_info: Option<UserContext>,
}

/// POST /api/auth/validate-password
///
/// 評価のみ（保存はしない）
pub async fn validate_password(
    State(state): State<AppState>,
    Json(request): Json<ValidatePasswordRequest>,
) -> Result<Json<PasswordValidationResult>, AppError> {
    validate_request(&request)?;

    let context = request.user_info.unwrap_or_default();
    Ok(Json(state.policy.evaluate(&request.password, &context)))
}

#[derive(Debug, Serialize)]
pub struct RequirementsResponse {
    pub requirements: Vec<String>,
    pub message: String,
}

/// GET /api/auth/password-requirements
pub async fn password_requirements(State(state): State<AppState>) -> Json<RequirementsResponse> {
    Json(RequirementsResponse {
        requirements: state.policy.requirements(),
        message: "パスワードは以下の要件をすべて満たす必要があります".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub password: String,
}

/// GET /api/auth/password-suggestion
pub async fn password_suggestion(State(state): State<AppState>) -> Json<SuggestionResponse> {
    Json(SuggestionResponse {
        password: state.policy.generate_suggestion(),
    })
}
