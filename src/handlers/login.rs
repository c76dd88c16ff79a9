use axum::{Json, extract::State};
use garde::Validate;
use serde::Deserialize;

use super::{AuthResponse, validate_request};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[garde(length(min = 1))]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// POST /api/auth/login
///
/// アカウント不在・パスワード不一致はどちらも同じエラーを返す
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    validate_request(&request)?;

    let account = state
        .auth_service
        .login(&request.email, &request.password)
        .await?;
    let token = state.sessions.issue(&account)?;

    Ok(Json(AuthResponse {
        message: "ログインしました".to_string(),
        token,
        account: account.to_public(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_fields() {
        let request = LoginRequest {
            email: "".to_string(),
            password: "x".to_string(),
        };
        assert!(validate_request(&request).is_err());

        let request = LoginRequest {
            email: "ken@example.com".to_string(),
            password: "".to_string(),
        };
        assert!(validate_request(&request).is_err());
    }
}
