use axum::{Json, extract::State, http::StatusCode};
use garde::Validate;
use serde::Deserialize;

use super::{AuthResponse, not_blank, validate_request};
use crate::error::AppError;
use crate::services::SignupInput;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String, // SecretBox不要（サービス層で即ハッシュ化）
    #[garde(length(max = 100), custom(not_blank))]
    pub first_name: String,
    #[garde(length(max = 100), custom(not_blank))]
    pub last_name: String,
}

/// POST /api/auth/signup
///
/// # Security
/// - パスワードはログに出力しない
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    validate_request(&request)?;

    let account = state
        .auth_service
        .signup(SignupInput {
            email: request.email,
            password: request.password,
            first_name: request.first_name,
            last_name: request.last_name,
        })
        .await?;

    let token = state.sessions.issue(&account)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "アカウントを作成しました".to_string(),
            token,
            account: account.to_public(),
        }),
    ))
}
