use std::sync::Arc;

use time::Duration;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{Account, TokenLookup, TokenRejection, normalize_email};
use crate::repositories::{AccountRepository, ResetTokenStore};
use crate::services::auth::prepare_new_password;
use crate::services::email::ResetNotifier;
use crate::services::password_policy::PasswordPolicy;

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    accounts: Arc<dyn AccountRepository>,
    tokens: Arc<dyn ResetTokenStore>,
    notifier: Arc<dyn ResetNotifier>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        tokens: Arc<dyn ResetTokenStore>,
        notifier: Arc<dyn ResetNotifier>,
        policy: PasswordPolicy,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            notifier,
            policy,
            clock,
            config,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - アカウントが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）は info 以上のログに出力しない（開発用 LogNotifier は debug でリセットURLを出力）
    /// - メール送信は別タスクで行い、応答を待たせない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            tracing::info!(email = %email, "パスワードリセット: アカウント不在（成功レスポンス返却）");
            return Ok(());
        };

        let now = self.clock.now();
        if self.config.revoke_outstanding_reset_tokens {
            let revoked = self.tokens.revoke_for_account(account.id, now).await?;
            if revoked > 0 {
                tracing::info!(account_id = %account.id, revoked, "未使用のリセットトークンを失効");
            }
        }

        let ttl = Duration::seconds(self.config.password_reset_token_ttl_secs);
        let token = self.tokens.issue(account.id, now, ttl).await?;

        let notifier = self.notifier.clone();
        let display_name = account.display_name();
        tokio::spawn(async move {
            if notifier
                .send_reset_link(&account.email, &token, &display_name)
                .await
            {
                tracing::info!(account_id = %account.id, "パスワードリセットメール送信完了");
            } else {
                tracing::error!(account_id = %account.id, "パスワードリセットメール送信失敗");
            }
        });

        Ok(())
    }

    /// トークンを確認し、対象アカウントを返す（トークンは消費しない）
    pub async fn verify_token(&self, token: &str) -> Result<Account, AppError> {
        let grant = match self.tokens.verify(token, self.clock.now()).await? {
            TokenLookup::Valid(grant) => grant,
            TokenLookup::Rejected(reason) => {
                tracing::info!(?reason, "リセットトークン確認: 無効");
                return Err(AppError::TokenInvalid(reason));
            }
        };

        self.accounts
            .find_by_id(grant.account_id)
            .await?
            .ok_or(AppError::TokenInvalid(TokenRejection::NotFound))
    }

    /// パスワードをリセット
    ///
    /// 処理順:
    /// 1. トークン消費（無効なら即失敗）
    /// 2. 新パスワードのポリシー検証（失敗してもトークンは消費済み）
    /// 3. 現在のパスワードとの同一チェック
    /// 4. ハッシュ更新
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let now = self.clock.now();

        let grant = match self.tokens.consume(token, now).await? {
            TokenLookup::Valid(grant) => grant,
            TokenLookup::Rejected(reason) => {
                tracing::warn!(?reason, "パスワードリセット失敗: 無効なトークン");
                return Err(AppError::TokenInvalid(reason));
            }
        };

        let account = self
            .accounts
            .find_by_id(grant.account_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(account_id = %grant.account_id, "パスワードリセット失敗: アカウント不在");
                AppError::TokenInvalid(TokenRejection::NotFound)
            })?;

        let password_hash = prepare_new_password(&self.policy, &account, new_password)?;

        self.accounts
            .update_password(account.id, &password_hash, now)
            .await?;

        tracing::info!(account_id = %account.id, "パスワードリセット完了");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::clock::ManualClock;
    use crate::repositories::{InMemoryAccountRepository, InMemoryResetTokenStore};
    use crate::services::auth::{AuthService, SignupInput, verify_password};
    use crate::services::email::ChannelNotifier;

    const OLD: &str = "Str0ng&Pass1234";
    const NEW: &str = "ValidNew#Pass99";

    struct Fixture {
        auth: AuthService,
        reset: PasswordResetService,
        accounts: Arc<InMemoryAccountRepository>,
        tokens: Arc<InMemoryResetTokenStore>,
        clock: Arc<ManualClock>,
        inbox: UnboundedReceiver<(String, String)>,
    }

    fn fixture(revoke_outstanding: bool) -> Fixture {
        let mut config = Config::from_pairs(vec![(
            "JWT_SECRET".to_string(),
            "test-secret".to_string(),
        )])
        .unwrap();
        config.revoke_outstanding_reset_tokens = revoke_outstanding;

        let accounts = Arc::new(InMemoryAccountRepository::new());
        let tokens = Arc::new(InMemoryResetTokenStore::new());
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let (notifier, inbox) = ChannelNotifier::channel();

        let auth = AuthService::new(accounts.clone(), PasswordPolicy::new(), clock.clone()).unwrap();
        let reset = PasswordResetService::new(
            accounts.clone(),
            tokens.clone(),
            Arc::new(notifier),
            PasswordPolicy::new(),
            clock.clone(),
            Arc::new(config),
        );

        Fixture {
            auth,
            reset,
            accounts,
            tokens,
            clock,
            inbox,
        }
    }

    impl Fixture {
        async fn signup(&self, email: &str) -> Account {
            self.auth
                .signup(SignupInput {
                    email: email.to_string(),
                    password: OLD.to_string(),
                    first_name: "Erin".to_string(),
                    last_name: "Sato".to_string(),
                })
                .await
                .unwrap()
        }

        /// リセットを要求し、配送されたトークンを受け取る
        async fn request_token(&mut self, email: &str) -> String {
            self.reset.request_reset(email).await.unwrap();
            let (to, token) = self.inbox.recv().await.unwrap();
            assert_eq!(to, normalize_email(email));
            token
        }

        async fn password_hash(&self, account: &Account) -> String {
            self.accounts
                .find_by_id(account.id)
                .await
                .unwrap()
                .unwrap()
                .password_hash
        }
    }

    #[tokio::test]
    async fn test_reset_then_old_password_fails() {
        let mut f = fixture(false);
        f.signup("erin@example.com").await;
        let token = f.request_token("erin@example.com").await;

        let account = f.reset.verify_token(&token).await.unwrap();
        assert_eq!(account.email, "erin@example.com");

        f.reset.reset_password(&token, NEW).await.unwrap();

        assert!(matches!(
            f.auth.login("erin@example.com", OLD).await,
            Err(AppError::InvalidCredentials)
        ));
        let account = f.auth.login("erin@example.com", NEW).await.unwrap();
        assert_eq!(account.password_changed_at, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_unknown_email_is_silent() {
        let mut f = fixture(false);
        f.reset.request_reset("nope@example.com").await.unwrap();
        assert!(f.tokens.is_empty());
        assert!(f.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_token_leaves_hash_unchanged() {
        let mut f = fixture(false);
        let account = f.signup("erin@example.com").await;
        let before = f.password_hash(&account).await;
        let token = f.request_token("erin@example.com").await;

        f.clock.advance(Duration::hours(1) + Duration::seconds(1));

        let result = f.reset.reset_password(&token, NEW).await;
        assert!(matches!(
            result,
            Err(AppError::TokenInvalid(TokenRejection::Expired))
        ));
        assert_eq!(f.password_hash(&account).await, before);
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let mut f = fixture(false);
        f.signup("erin@example.com").await;
        let token = f.request_token("erin@example.com").await;

        f.reset.reset_password(&token, NEW).await.unwrap();

        let result = f.reset.reset_password(&token, "An0ther&Secret77").await;
        assert!(matches!(
            result,
            Err(AppError::TokenInvalid(TokenRejection::AlreadyUsed))
        ));
        assert!(matches!(
            f.reset.verify_token(&token).await,
            Err(AppError::TokenInvalid(TokenRejection::AlreadyUsed))
        ));
    }

    #[tokio::test]
    async fn test_weak_password_burns_token() {
        let mut f = fixture(false);
        let account = f.signup("erin@example.com").await;
        let before = f.password_hash(&account).await;
        let token = f.request_token("erin@example.com").await;

        let result = f.reset.reset_password(&token, "short").await;
        assert!(matches!(result, Err(AppError::WeakPassword(_))));
        assert_eq!(f.password_hash(&account).await, before);

        // トークンは消費済み
        let result = f.reset.reset_password(&token, NEW).await;
        assert!(matches!(
            result,
            Err(AppError::TokenInvalid(TokenRejection::AlreadyUsed))
        ));
    }

    #[tokio::test]
    async fn test_personal_information_checked_against_account() {
        let mut f = fixture(false);
        f.signup("erin@example.com").await;
        let token = f.request_token("erin@example.com").await;

        let result = f.reset.reset_password(&token, "Sato#Garden2024").await;
        assert!(matches!(result, Err(AppError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn test_same_password_is_rejected() {
        let mut f = fixture(false);
        let account = f.signup("erin@example.com").await;
        let before = f.password_hash(&account).await;
        let token = f.request_token("erin@example.com").await;

        let result = f.reset.reset_password(&token, OLD).await;
        assert!(matches!(result, Err(AppError::PasswordUnchanged)));
        assert_eq!(f.password_hash(&account).await, before);
        assert!(verify_password(OLD, &before).unwrap());
    }

    #[tokio::test]
    async fn test_outstanding_tokens_independent_by_default() {
        let mut f = fixture(false);
        f.signup("erin@example.com").await;
        let first = f.request_token("erin@example.com").await;
        let second = f.request_token("erin@example.com").await;

        assert!(f.reset.verify_token(&first).await.is_ok());
        assert!(f.reset.verify_token(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_outstanding_tokens_when_enabled() {
        let mut f = fixture(true);
        f.signup("erin@example.com").await;
        let first = f.request_token("erin@example.com").await;
        let second = f.request_token("erin@example.com").await;

        assert!(matches!(
            f.reset.verify_token(&first).await,
            Err(AppError::TokenInvalid(TokenRejection::AlreadyUsed))
        ));
        assert!(f.reset.verify_token(&second).await.is_ok());
    }
}
