use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// トークンのバイト長（256ビット）
const TOKEN_BYTES: usize = 32;

/// パスワードリセットトークン
///
/// トークン自体はハッシュ化して保存（token_hash）
/// 平文トークンはユーザーにメールで送信し、ストアには保存しない
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub token_hash: String,
    pub account_id: Uuid,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub used_at: Option<OffsetDateTime>,
}

impl PasswordResetToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// `now` 時点での状態を判定
    ///
    /// 判定順: 期限切れ → 使用済み（期限切れは使用済みより優先）
    pub fn check(&self, now: OffsetDateTime) -> TokenLookup {
        if now > self.expires_at {
            TokenLookup::Rejected(TokenRejection::Expired)
        } else if self.is_used() {
            TokenLookup::Rejected(TokenRejection::AlreadyUsed)
        } else {
            TokenLookup::Valid(ResetGrant {
                account_id: self.account_id,
                expires_at: self.expires_at,
            })
        }
    }
}

/// トークンが無効な理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    NotFound,
    AlreadyUsed,
    Expired,
}

/// 有効なトークンが許可するリセット対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetGrant {
    pub account_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// verify / consume の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLookup {
    Valid(ResetGrant),
    Rejected(TokenRejection),
}

impl TokenLookup {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn rejection(&self) -> Option<TokenRejection> {
        match self {
            Self::Valid(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

/// 32バイトのランダムトークンを生成（URL-safe Base64）
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA256でハッシュ化
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(used: bool) -> PasswordResetToken {
        let issued_at = OffsetDateTime::UNIX_EPOCH;
        PasswordResetToken {
            token_hash: hash_token("t"),
            account_id: Uuid::new_v4(),
            issued_at,
            expires_at: issued_at + Duration::hours(1),
            used_at: used.then_some(issued_at),
        }
    }

    #[test]
    fn test_generate_token_is_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32バイト → パディングなしBase64で43文字
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash, hash_token("abc"));
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, hash_token("abd"));
    }

    #[test]
    fn test_check_valid_until_expiry_inclusive() {
        let token = record(false);
        assert!(token.check(token.expires_at).is_valid());
        assert_eq!(
            token.check(token.expires_at + Duration::seconds(1)).rejection(),
            Some(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_check_expired_wins_over_used() {
        let token = record(true);
        assert_eq!(
            token.check(token.issued_at).rejection(),
            Some(TokenRejection::AlreadyUsed)
        );
        assert_eq!(
            token.check(token.expires_at + Duration::minutes(1)).rejection(),
            Some(TokenRejection::Expired)
        );
    }
}
