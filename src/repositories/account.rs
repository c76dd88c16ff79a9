use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Account, NewAccount};

/// アカウントの永続化先
///
/// email は正規化済み（`normalize_email`）の値を受け取る前提
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// メールアドレスでアカウントを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    /// アカウントIDで検索
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError>;

    /// 新しいアカウントを作成
    ///
    /// # Errors
    /// - email が既に存在する場合: `AppError::EmailAlreadyExists`
    async fn create(
        &self,
        new_account: NewAccount,
        now: OffsetDateTime,
    ) -> Result<Account, AppError>;

    /// パスワードハッシュを更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    async fn update_password(
        &self,
        account_id: Uuid,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// 氏名を更新し、更新後のアカウントを返す
    async fn update_profile(
        &self,
        account_id: Uuid,
        first_name: &str,
        last_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Account>, AppError>;
}

/// インメモリ実装
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: DashMap<Uuid, Account>,
    /// email → id（一意性の保証に使用）
    emails: DashMap<String, Uuid>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account_id = self.emails.get(email).map(|id| *id);
        Ok(account_id.and_then(|id| self.accounts.get(&id).map(|a| a.clone())))
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.get(&account_id).map(|a| a.clone()))
    }

    async fn create(
        &self,
        new_account: NewAccount,
        now: OffsetDateTime,
    ) -> Result<Account, AppError> {
        // email のエントリをロックしたまま作成し、同時登録を排除する
        match self.emails.entry(new_account.email.clone()) {
            Entry::Occupied(_) => Err(AppError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let account = Account {
                    id: Uuid::new_v4(),
                    email: new_account.email,
                    password_hash: new_account.password_hash,
                    first_name: new_account.first_name,
                    last_name: new_account.last_name,
                    password_changed_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.accounts.insert(account.id, account.clone());
                slot.insert(account.id);
                Ok(account)
            }
        }
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut account = self.accounts.get_mut(&account_id).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("account {account_id} not found"))
        })?;
        account.password_hash = new_password_hash.to_string();
        account.password_changed_at = Some(changed_at);
        account.updated_at = changed_at;
        Ok(())
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        first_name: &str,
        last_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.get_mut(&account_id).map(|mut account| {
            account.first_name = first_name.to_string();
            account.last_name = last_name.to_string();
            account.updated_at = now;
            account.clone()
        }))
    }
}
