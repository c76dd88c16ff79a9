use axum::{
    Json,
    extract::{Path, State},
};
use garde::Validate;
use serde::{Deserialize, Serialize};

use super::{MessageResponse, validate_request};
use crate::error::AppError;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    #[garde(email)]
    pub email: String,
}

/// POST /api/auth/forgot-password
///
/// # Security
/// 常に同じ200レスポンスを返す（アカウント存在有無を漏洩しない）
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_request(&request)?;

    state
        .password_reset_service
        .request_reset(&request.email)
        .await?;

    Ok(Json(MessageResponse::new(
        "該当するアカウントが存在する場合、パスワード再設定用のメールを送信しました",
    )))
}

// === トークン確認 ===

#[derive(Debug, Serialize)]
pub struct VerifyResetTokenResponse {
    pub valid: bool,
    pub email: String,
}

/// GET /api/auth/verify-reset-token/{token}
///
/// トークンは消費しない
pub async fn verify_reset_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VerifyResetTokenResponse>, AppError> {
    let account = state.password_reset_service.verify_token(&token).await?;

    Ok(Json(VerifyResetTokenResponse {
        valid: true,
        email: account.email,
    }))
}

// === パスワードリセット実行 ===

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[garde(length(min = 1))]
    pub token: String,
    #[garde(length(min = 1))]
    pub new_password: String,
}

/// POST /api/auth/reset-password
///
/// # Security
/// - token, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_request(&request)?;

    state
        .password_reset_service
        .reset_password(&request.token, &request.new_password)
        .await?;

    Ok(Json(MessageResponse::new(
        "パスワードが更新されました。新しいパスワードでログインしてください",
    )))
}
