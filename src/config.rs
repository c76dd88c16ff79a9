use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// 未設定の場合はインメモリストアで起動する
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // セッショントークン（JWT）設定
    pub jwt_secret: SecretBox<String>,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,

    /// フロントエンドのオリジン（CORS 許可・リセットURLの既定値）
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,
    #[serde(default = "default_smtp_timeout_secs")]
    pub smtp_timeout_secs: u64,

    // パスワードリセット設定
    #[serde(default)]
    pub password_reset_url_base: Option<String>,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
    #[serde(default = "default_token_sweep_interval_secs")]
    pub token_sweep_interval_secs: u64,
    /// true の場合、新しいトークン発行時に同一アカウントの未使用トークンを失効させる
    #[serde(default)]
    pub revoke_outstanding_reset_tokens: bool,

    // レート制限（クライアントIP単位）
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 3600;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_TOKEN_SWEEP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_frontend_url() -> String {
    DEFAULT_FRONTEND_URL.to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_smtp_timeout_secs() -> u64 {
    DEFAULT_SMTP_TIMEOUT_SECS
}

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_token_sweep_interval_secs() -> u64 {
    DEFAULT_TOKEN_SWEEP_INTERVAL_SECS
}

fn default_rate_limit_max_requests() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 環境変数の代わりにキー/値の組から読み込む（テスト・ツール用）
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }

    /// リセットリンクのベースURL
    pub fn reset_url_base(&self) -> String {
        match &self.password_reset_url_base {
            Some(base) => base.clone(),
            None => format!("{}/reset-password", self.frontend_url.trim_end_matches('/')),
        }
    }

    /// SMTP の必須項目が揃っているか
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some()
            && self.smtp_username.is_some()
            && self.smtp_password.is_some()
            && self.smtp_from_address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut pairs = vec![("JWT_SECRET".to_string(), "test-secret".to_string())];
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        pairs
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_pairs(pairs(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.password_reset_token_ttl_secs, 3600);
        assert_eq!(config.token_sweep_interval_secs, 3600);
        assert!(config.database_url.is_none());
        assert!(!config.revoke_outstanding_reset_tokens);
        assert!(!config.smtp_configured());
        assert_eq!(config.rate_limit_max_requests, 100);
        assert_eq!(config.rate_limit_window_secs, 900);
    }

    #[test]
    fn test_missing_jwt_secret_is_error() {
        let result = Config::from_pairs(Vec::<(String, String)>::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_reset_url_base_falls_back_to_frontend() {
        let config = Config::from_pairs(pairs(&[("FRONTEND_URL", "https://app.example/")])).unwrap();
        assert_eq!(config.reset_url_base(), "https://app.example/reset-password");

        let config = Config::from_pairs(pairs(&[(
            "PASSWORD_RESET_URL_BASE",
            "https://app.example/pw",
        )]))
        .unwrap();
        assert_eq!(config.reset_url_base(), "https://app.example/pw");
    }
}
