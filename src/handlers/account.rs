use axum::{Json, extract::State};
use garde::Validate;
use serde::Deserialize;

use super::{AuthenticatedAccount, MessageResponse, not_blank_if_present, validate_request};
use crate::error::AppError;
use crate::models::PublicAccount;
use crate::state::AppState;

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
) -> Result<Json<PublicAccount>, AppError> {
    let account = state.auth_service.profile(auth.account_id).await?;
    Ok(Json(account.to_public()))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[garde(length(max = 100), custom(not_blank_if_present))]
    pub first_name: Option<String>,
    #[garde(length(max = 100), custom(not_blank_if_present))]
    pub last_name: Option<String>,
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<PublicAccount>, AppError> {
    validate_request(&request)?;

    let account = state
        .auth_service
        .update_profile(
            auth.account_id,
            request.first_name.as_deref(),
            request.last_name.as_deref(),
        )
        .await?;

    Ok(Json(account.to_public()))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1))]
    pub current_password: String,
    #[garde(length(min = 1))]
    pub new_password: String,
}

/// POST /api/auth/change-password
///
/// # Security
/// - current_password, new_password はログに出力しない
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthenticatedAccount,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_request(&request)?;

    state
        .auth_service
        .change_password(
            auth.account_id,
            &request.current_password,
            &request.new_password,
        )
        .await?;

    Ok(Json(MessageResponse::new("パスワードを変更しました")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_profile_fields_are_optional() {
        let request: UpdateProfileRequest = serde_json::from_str(r#"{"lastName":"Mori"}"#).unwrap();
        assert!(request.first_name.is_none());
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_update_profile_rejects_blank() {
        let request = UpdateProfileRequest {
            first_name: Some("  ".to_string()),
            last_name: None,
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn test_change_password_requires_both() {
        let request = ChangePasswordRequest {
            current_password: "Str0ng&Pass1234".to_string(),
            new_password: "".to_string(),
        };
        assert!(validate_request(&request).is_err());
    }
}
