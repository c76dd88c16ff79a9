use std::sync::Arc;

use secrecy::ExposeSecret;
use time::Duration;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{AccountRepository, ResetTokenStore};
use crate::services::{
    AuthService, PasswordPolicy, PasswordResetService, ResetNotifier, SessionService,
};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// パスワードポリシー
    pub policy: PasswordPolicy,
    /// セッショントークン
    pub sessions: SessionService,
    /// 認証サービス
    pub auth_service: AuthService,
    /// パスワードリセットサービス
    pub password_reset_service: PasswordResetService,
}

impl AppState {
    /// 新しい AppState を作成
    ///
    /// ストア・配送・時計は呼び出し側で選択する（本番は PostgreSQL / SMTP、テストはインメモリ）
    pub fn new(
        config: Config,
        accounts: Arc<dyn AccountRepository>,
        tokens: Arc<dyn ResetTokenStore>,
        notifier: Arc<dyn ResetNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let policy = PasswordPolicy::new();

        let sessions = SessionService::new(
            config.jwt_secret.expose_secret(),
            Duration::seconds(config.session_ttl_secs),
        );
        let auth_service = AuthService::new(accounts.clone(), policy, clock.clone())?;
        let password_reset_service = PasswordResetService::new(
            accounts,
            tokens,
            notifier,
            policy,
            clock,
            config.clone(),
        );

        Ok(Self {
            config,
            policy,
            sessions,
            auth_service,
            password_reset_service,
        })
    }
}
