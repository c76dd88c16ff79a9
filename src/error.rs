use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::models::TokenRejection;
use crate::services::password_policy::{PasswordValidationResult, PolicyViolation};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("メールアドレスまたはパスワードが正しくありません")]
    InvalidCredentials,

    #[error("認証が必要です")]
    Unauthorized,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("パスワードがセキュリティ要件を満たしていません")]
    WeakPassword(Box<PasswordValidationResult>),

    #[error("無効なリセットトークン: {0:?}")]
    TokenInvalid(TokenRejection),

    #[error("新しいパスワードは現在のパスワードと異なる必要があります")]
    PasswordUnchanged,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<TokenRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<PolicyViolation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requirements: Option<Vec<String>>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            valid: None,
            reason: None,
            errors: None,
            suggestions: None,
            requirements: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::message("メールアドレスまたはパスワードが正しくありません"),
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::message("認証が必要です"),
            ),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::message(msg)),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("内部エラーが発生しました"),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::message("内部エラーが発生しました"),
                )
            }
            Self::EmailAlreadyExists => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::message("このメールアドレスは既に使用されています"),
            ),
            Self::WeakPassword(result) => {
                let result = *result;
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        errors: Some(result.errors),
                        suggestions: Some(result.suggestions),
                        requirements: Some(result.requirements),
                        ..ErrorResponse::message(
                            "パスワードがセキュリティ要件を満たしていません",
                        )
                    },
                )
            }
            Self::TokenInvalid(reason) => {
                let message = match reason {
                    TokenRejection::NotFound => "無効なリセットトークンです",
                    TokenRejection::AlreadyUsed => "このリセットトークンは既に使用されています",
                    TokenRejection::Expired => {
                        "リセットトークンの有効期限が切れています。再度リセットをリクエストしてください"
                    }
                };
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        valid: Some(false),
                        reason: Some(reason),
                        ..ErrorResponse::message(message)
                    },
                )
            }
            Self::PasswordUnchanged => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::message("新しいパスワードは現在のパスワードと異なる必要があります"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_token_invalid_carries_reason() {
        let response = AppError::TokenInvalid(TokenRejection::Expired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "expired");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response =
            AppError::Internal(anyhow::anyhow!("connection refused: 10.0.0.1")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "内部エラーが発生しました");
        assert!(json.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
