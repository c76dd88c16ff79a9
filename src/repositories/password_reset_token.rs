use async_trait::async_trait;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    PasswordResetToken, TokenLookup, TokenRejection, generate_token, hash_token,
};

/// パスワードリセットトークンのストア
///
/// トークンのライフサイクル（発行・検証・消費・掃除）の唯一の管理者。
/// 平文トークンは保持せず、SHA256ハッシュをキーにする。
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// トークンを発行し、平文トークンを返す
    ///
    /// 同一アカウントの既存トークンには影響しない
    async fn issue(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<String, AppError>;

    /// トークンの状態を確認（副作用なし）
    async fn verify(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError>;

    /// トークンを消費
    ///
    /// 有効な場合のみ使用済みにする。同一トークンへの同時呼び出しでは
    /// ちょうど1つだけが `Valid` を受け取る。
    async fn consume(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError>;

    /// アカウントの未使用トークンをすべて使用済みにする
    ///
    /// # Returns
    /// 失効させた件数
    async fn revoke_for_account(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, AppError>;

    /// 使用済み・期限切れトークンを削除
    ///
    /// # Returns
    /// 削除された件数
    async fn sweep(&self, now: OffsetDateTime) -> Result<u64, AppError>;
}

/// インメモリ実装
///
/// consume はシャードの書き込みロック内で判定と更新を行う
#[derive(Debug, Default)]
pub struct InMemoryResetTokenStore {
    tokens: DashMap<String, PasswordResetToken>,
}

impl InMemoryResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl ResetTokenStore for InMemoryResetTokenStore {
    async fn issue(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let token = generate_token();
        let record = PasswordResetToken {
            token_hash: hash_token(&token),
            account_id,
            issued_at: now,
            expires_at: now + ttl,
            used_at: None,
        };
        self.tokens.insert(record.token_hash.clone(), record);
        Ok(token)
    }

    async fn verify(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError> {
        Ok(match self.tokens.get(&hash_token(token)) {
            Some(record) => record.check(now),
            None => TokenLookup::Rejected(TokenRejection::NotFound),
        })
    }

    async fn consume(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError> {
        let Some(mut record) = self.tokens.get_mut(&hash_token(token)) else {
            return Ok(TokenLookup::Rejected(TokenRejection::NotFound));
        };

        let lookup = record.check(now);
        if lookup.is_valid() {
            record.used_at = Some(now);
        }
        Ok(lookup)
    }

    async fn revoke_for_account(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, AppError> {
        let mut revoked = 0;
        for mut record in self.tokens.iter_mut() {
            if record.account_id == account_id && record.check(now).is_valid() {
                record.used_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn sweep(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let mut removed = 0;
        self.tokens.retain(|_, record| {
            let keep = !record.is_used() && record.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
