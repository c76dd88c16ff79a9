use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Account;

/// セッショントークン（JWT）のクレーム
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// アカウントID
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// セッショントークンの発行・検証
///
/// # Security
/// - トークン文字列・署名鍵はログに出力しない
#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// アカウントのセッショントークンを発行
    pub fn issue(&self, account: &Account) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: account.id,
            email: account.email.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            jti: Uuid::new_v4(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = ?e, "セッショントークン生成エラー");
            AppError::Internal(anyhow::anyhow!("session token encode error"))
        })
    }

    /// トークンを検証しクレームを返す
    ///
    /// 署名不正・期限切れはすべて `Unauthorized`
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "セッショントークン検証失敗");
                AppError::Unauthorized
            })
    }
}
