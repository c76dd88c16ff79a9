pub mod account;
pub mod authenticated;
pub mod health;
pub mod login;
pub mod password_policy;
pub mod password_reset;
pub mod signup;

use garde::Validate;
use serde::Serialize;

use crate::error::AppError;
use crate::models::PublicAccount;

pub use account::{change_password, get_profile, update_profile};
pub use authenticated::AuthenticatedAccount;
pub use health::health_check;
pub use login::login;
pub use password_policy::{password_requirements, password_suggestion, validate_password};
pub use password_reset::{forgot_password, reset_password, verify_reset_token};
pub use signup::signup;

/// サインアップ・ログイン成功時のレスポンス
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub account: PublicAccount,
}

/// メッセージのみのレスポンス
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// リクエストDTOのバリデーション
pub(crate) fn validate_request<T>(request: &T) -> Result<(), AppError>
where
    T: Validate,
    T::Context: Default,
{
    request.validate().map_err(|report| {
        tracing::info!(error = %report, "リクエストのバリデーションエラー");
        AppError::Validation(report.to_string())
    })
}

/// 空白のみの文字列を拒否
pub(crate) fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("空白のみは入力できません"));
    }
    Ok(())
}

/// 指定された場合のみ空白チェック
pub(crate) fn not_blank_if_present(value: &Option<String>, ctx: &()) -> garde::Result {
    match value {
        Some(value) => not_blank(value, ctx),
        None => Ok(()),
    }
}
