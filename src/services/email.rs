use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::AppError;

const RESET_EMAIL_SUBJECT: &str = "パスワード再設定のご案内 - PathPilot";

/// リセットリンクの配送先
///
/// 失敗は `false` で返し、呼び出し側のリクエストを失敗させない
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_link(&self, to: &str, token: &str, display_name: &str) -> bool;
}

/// リセットURLを構築
pub fn build_reset_url(base: &str, token: &str) -> String {
    format!("{}?token={}", base, token)
}

/// 開発用の配送（メール送信せずログ出力のみ）
///
/// リセットURL（トークンを含む）は debug レベルでのみ出力する
#[derive(Debug, Clone)]
pub struct LogNotifier {
    reset_url_base: String,
}

impl LogNotifier {
    pub fn new(reset_url_base: String) -> Self {
        Self { reset_url_base }
    }
}

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_link(&self, to: &str, token: &str, display_name: &str) -> bool {
        let reset_url = build_reset_url(&self.reset_url_base, token);
        tracing::info!(
            to = %to,
            subject = RESET_EMAIL_SUBJECT,
            "パスワードリセットメール送信（開発モード）"
        );
        tracing::debug!(reset_url = %reset_url, "リセットURL");
        tracing::debug!(body = %render_text(&reset_url, display_name), "メール本文");
        true
    }
}

/// チャネルに (宛先, トークン) を流す配送（テスト・組み込み用）
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<(String, String)>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ResetNotifier for ChannelNotifier {
    async fn send_reset_link(&self, to: &str, token: &str, _display_name: &str) -> bool {
        self.sender
            .send((to.to_string(), token.to_string()))
            .is_ok()
    }
}

/// 設定から配送方法を選択
///
/// `email` 機能が有効かつ SMTP 設定が揃っている場合のみ SMTP を使用
pub fn notifier_from_config(config: &Config) -> Result<Arc<dyn ResetNotifier>, AppError> {
    #[cfg(feature = "email")]
    if config.smtp_configured() {
        tracing::info!("SMTP メール送信を使用");
        return Ok(Arc::new(smtp::SmtpNotifier::from_config(config)?));
    }

    tracing::info!("メール送信未設定（ログ出力で代替）");
    Ok(Arc::new(LogNotifier::new(config.reset_url_base())))
}

fn render_text(reset_url: &str, display_name: &str) -> String {
    format!(
        "{display_name} 様\n\n\
         パスワード再設定のリクエストを受け付けました。\n\
         以下のリンクから1時間以内に新しいパスワードを設定してください。\n\n\
         {reset_url}\n\n\
         このメールに心当たりがない場合は破棄してください。パスワードは変更されません。\n"
    )
}

#[cfg_attr(not(feature = "email"), allow(dead_code))]
fn render_html(reset_url: &str, display_name: &str) -> String {
    format!(
        "<p>{display_name} 様</p>\
         <p>パスワード再設定のリクエストを受け付けました。<br>\
         以下のボタンから1時間以内に新しいパスワードを設定してください。</p>\
         <p><a href=\"{reset_url}\">パスワードを再設定する</a></p>\
         <p>このメールに心当たりがない場合は破棄してください。パスワードは変更されません。</p>"
    )
}

#[cfg(feature = "email")]
mod smtp {
    use std::time::Duration;

    use async_trait::async_trait;
    use lettre::message::{Mailbox, MultiPart};
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use secrecy::ExposeSecret;

    use super::{RESET_EMAIL_SUBJECT, ResetNotifier, build_reset_url, render_html, render_text};
    use crate::config::Config;
    use crate::error::AppError;

    /// SMTP によるメール送信
    pub struct SmtpNotifier {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        reset_url_base: String,
    }

    impl SmtpNotifier {
        pub fn from_config(config: &Config) -> Result<Self, AppError> {
            let (Some(host), Some(username), Some(password), Some(from)) = (
                &config.smtp_host,
                &config.smtp_username,
                &config.smtp_password,
                &config.smtp_from_address,
            ) else {
                return Err(AppError::Internal(anyhow::anyhow!("smtp is not configured")));
            };

            let from: Mailbox = from.parse().map_err(|e| {
                tracing::error!(error = ?e, "送信元アドレスのパースに失敗");
                AppError::Internal(anyhow::anyhow!("invalid smtp from address"))
            })?;

            let credentials = Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            );

            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| {
                    tracing::error!(error = ?e, "SMTP トランスポートの初期化に失敗");
                    AppError::Internal(anyhow::anyhow!("smtp transport error"))
                })?
                .port(config.smtp_port)
                .credentials(credentials)
                .timeout(Some(Duration::from_secs(config.smtp_timeout_secs)))
                .build();

            Ok(Self {
                transport,
                from,
                reset_url_base: config.reset_url_base(),
            })
        }
    }

    #[async_trait]
    impl ResetNotifier for SmtpNotifier {
        async fn send_reset_link(&self, to: &str, token: &str, display_name: &str) -> bool {
            let reset_url = build_reset_url(&self.reset_url_base, token);

            let to_mailbox: Mailbox = match to.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    tracing::error!(error = ?e, to = %to, "宛先アドレスのパースに失敗");
                    return false;
                }
            };

            let message = match Message::builder()
                .from(self.from.clone())
                .to(to_mailbox)
                .subject(RESET_EMAIL_SUBJECT)
                .multipart(MultiPart::alternative_plain_html(
                    render_text(&reset_url, display_name),
                    render_html(&reset_url, display_name),
                )) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = ?e, "メール本文の構築に失敗");
                    return false;
                }
            };

            match self.transport.send(message).await {
                Ok(response) => {
                    tracing::info!(to = %to, code = %response.code(), "パスワードリセットメール送信完了");
                    true
                }
                Err(e) => {
                    tracing::error!(error = ?e, to = %to, "パスワードリセットメール送信失敗");
                    false
                }
            }
        }
    }
}
