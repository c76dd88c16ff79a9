use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{Account, NewAccount, normalize_email};
use crate::repositories::AccountRepository;
use crate::services::password_policy::{PasswordPolicy, UserContext};

/// ユーザー不在時のタイミング攻撃対策に使う照合用パスワード
const DUMMY_PASSWORD: &str = "timing-equalization-dummy-password";

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証（argon2 の比較は定数時間）
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => {
            tracing::error!(error = ?e, "パスワード検証エラー");
            Err(AppError::Internal(anyhow::anyhow!(
                "password verification error"
            )))
        }
    }
}

/// アカウントを文脈にしたパスワード評価コンテキスト
pub fn context_for(account: &Account) -> UserContext {
    UserContext {
        email: Some(account.email.clone()),
        first_name: Some(account.first_name.clone()),
        last_name: Some(account.last_name.clone()),
    }
}

/// 新しいパスワードを検査してハッシュを返す
///
/// 1. ポリシー違反 → `WeakPassword`
/// 2. 現在のパスワードと同一 → `PasswordUnchanged`
pub(crate) fn prepare_new_password(
    policy: &PasswordPolicy,
    account: &Account,
    new_password: &str,
) -> Result<String, AppError> {
    let validation = policy.evaluate(new_password, &context_for(account));
    if !validation.is_valid {
        tracing::info!(account_id = %account.id, "新パスワードがポリシー違反");
        return Err(AppError::WeakPassword(Box::new(validation)));
    }

    if verify_password(new_password, &account.password_hash)? {
        tracing::info!(account_id = %account.id, "新パスワードが現在と同一");
        return Err(AppError::PasswordUnchanged);
    }

    hash_password(new_password)
}

/// サインアップの入力
#[derive(Debug)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// 認証サービス
///
/// アカウントの作成・ログイン・パスワード変更・プロフィール更新を担当する。
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
    dummy_hash: Arc<str>,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        policy: PasswordPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password(DUMMY_PASSWORD)?;
        Ok(Self {
            accounts,
            policy,
            clock,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// アカウントを作成
    ///
    /// # Security
    /// - パスワードはログに出力しない
    /// - パスワードは即座にハッシュ化
    pub async fn signup(&self, input: SignupInput) -> Result<Account, AppError> {
        let email = normalize_email(&input.email);

        if self.accounts.find_by_email(&email).await?.is_some() {
            tracing::info!(email = %email, "サインアップ失敗: メールアドレス重複");
            return Err(AppError::EmailAlreadyExists);
        }

        let context = UserContext {
            email: Some(email.clone()),
            first_name: Some(input.first_name.clone()),
            last_name: Some(input.last_name.clone()),
        };
        let validation = self.policy.evaluate(&input.password, &context);
        if !validation.is_valid {
            tracing::info!(email = %email, "サインアップ失敗: パスワードがポリシー違反");
            return Err(AppError::WeakPassword(Box::new(validation)));
        }

        let password_hash = hash_password(&input.password)?;
        let account = self
            .accounts
            .create(
                NewAccount {
                    email,
                    password_hash,
                    first_name: input.first_name.trim().to_string(),
                    last_name: input.last_name.trim().to_string(),
                },
                self.clock.now(),
            )
            .await?;

        tracing::info!(account_id = %account.id, email = %account.email, "アカウント作成");
        Ok(account)
    }

    /// ログイン認証
    ///
    /// タイミング攻撃対策: アカウントが存在しない場合もダミーのパスワード検証を実行
    pub async fn login(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let email = normalize_email(email);

        match self.accounts.find_by_email(&email).await? {
            Some(account) => {
                if verify_password(password, &account.password_hash)? {
                    tracing::info!(account_id = %account.id, "認証成功");
                    Ok(account)
                } else {
                    tracing::warn!(email = %email, "認証失敗: パスワード不一致");
                    Err(AppError::InvalidCredentials)
                }
            }
            None => {
                // 応答時間からアカウントの存在有無を推測できないようにする
                let _ = verify_password(password, &self.dummy_hash);
                tracing::warn!(email = %email, "認証失敗: アカウント不在");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// ログイン中のアカウントのパスワードを変更
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let account = self.profile(account_id).await?;

        if !verify_password(current_password, &account.password_hash)? {
            tracing::warn!(account_id = %account_id, "パスワード変更失敗: 現在のパスワード不一致");
            return Err(AppError::InvalidCredentials);
        }

        let password_hash = prepare_new_password(&self.policy, &account, new_password)?;
        self.accounts
            .update_password(account_id, &password_hash, self.clock.now())
            .await?;

        tracing::info!(account_id = %account_id, "パスワード変更完了");
        Ok(())
    }

    /// アカウントを取得
    pub async fn profile(&self, account_id: Uuid) -> Result<Account, AppError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// 氏名を更新（未指定の項目は現在値を維持）
    pub async fn update_profile(
        &self,
        account_id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Account, AppError> {
        let current = self.profile(account_id).await?;
        let first_name = first_name.map(str::trim).unwrap_or(&current.first_name);
        let last_name = last_name.map(str::trim).unwrap_or(&current.last_name);

        let account = self
            .accounts
            .update_profile(account_id, first_name, last_name, self.clock.now())
            .await?
            .ok_or(AppError::Unauthorized)?;

        tracing::info!(account_id = %account_id, "プロフィール更新");
        Ok(account)
    }
}
