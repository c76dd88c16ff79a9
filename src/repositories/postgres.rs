use async_trait::async_trait;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Account, NewAccount, PasswordResetToken, ResetGrant, TokenLookup, TokenRejection,
    generate_token, hash_token,
};
use crate::repositories::{AccountRepository, ResetTokenStore};

/// UNIQUE制約（LOWER(email) のユニークインデックス）名
const ACCOUNTS_EMAIL_KEY: &str = "accounts_email_key";

/// PostgreSQL によるアカウントリポジトリ
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, first_name, last_name,
                   password_changed_at, created_at, updated_at
            FROM accounts
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, first_name, last_name,
                   password_changed_at, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn create(
        &self,
        new_account: NewAccount,
        now: OffsetDateTime,
    ) -> Result<Account, AppError> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, password_hash, first_name, last_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, email, password_hash, first_name, last_name,
                      password_changed_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_account.email)
        .bind(&new_account.password_hash)
        .bind(&new_account.first_name)
        .bind(&new_account.last_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let sqlx::Error::Database(db_err) = &e
                && db_err.constraint() == Some(ACCOUNTS_EMAIL_KEY)
            {
                return AppError::EmailAlreadyExists;
            }
            AppError::Database(e)
        })
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $2, password_changed_at = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(new_password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "account {account_id} not found"
            )));
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        first_name: &str,
        last_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET first_name = $2, last_name = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, email, password_hash, first_name, last_name,
                      password_changed_at, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }
}

/// PostgreSQL によるリセットトークンストア
///
/// consume は条件付き UPDATE 1文で判定と更新を行う
#[derive(Clone)]
pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, AppError> {
        let record = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT token_hash, account_id, issued_at, expires_at, used_at
            FROM password_reset_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn issue(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let token = generate_token();

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token_hash, account_id, issued_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(hash_token(&token))
        .bind(account_id)
        .bind(now)
        .bind(now + ttl)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    async fn verify(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError> {
        Ok(match self.find_by_token_hash(&hash_token(token)).await? {
            Some(record) => record.check(now),
            None => TokenLookup::Rejected(TokenRejection::NotFound),
        })
    }

    async fn consume(&self, token: &str, now: OffsetDateTime) -> Result<TokenLookup, AppError> {
        let token_hash = hash_token(token);

        let consumed = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(
            r#"
            UPDATE password_reset_tokens
            SET used_at = $2
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at >= $2
            RETURNING account_id, expires_at
            "#,
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((account_id, expires_at)) = consumed {
            return Ok(TokenLookup::Valid(ResetGrant {
                account_id,
                expires_at,
            }));
        }

        // 更新できなかった理由を分類
        Ok(match self.find_by_token_hash(&token_hash).await? {
            None => TokenLookup::Rejected(TokenRejection::NotFound),
            Some(record) => match record.check(now) {
                TokenLookup::Valid(_) => TokenLookup::Rejected(TokenRejection::AlreadyUsed),
                rejected => rejected,
            },
        })
    }

    async fn revoke_for_account(
        &self,
        account_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET used_at = $2
            WHERE account_id = $1 AND used_at IS NULL AND expires_at >= $2
            "#,
        )
        .bind(account_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn sweep(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE used_at IS NOT NULL OR expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
