use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pathpilot_auth::{
    clock::{Clock, SystemClock},
    config::Config,
    repositories::{
        AccountRepository, InMemoryAccountRepository, InMemoryResetTokenStore,
        PgAccountRepository, PgResetTokenStore, ResetTokenStore,
    },
    routes::create_router,
    services::{TokenSweeper, notifier_from_config},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("pathpilot-auth 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, "設定読み込み完了");

    // サーバーアドレスを先に構築（config が move される前に）
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    let (accounts, tokens) = build_stores(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let notifier = notifier_from_config(&config).map_err(|e| {
        tracing::error!(error = ?e, "メール送信の初期化に失敗");
        anyhow::anyhow!("Failed to create notifier: {}", e)
    })?;

    // 期限切れトークンの定期削除
    let shutdown = CancellationToken::new();
    let sweeper = TokenSweeper::new(
        tokens.clone(),
        clock.clone(),
        Duration::from_secs(config.token_sweep_interval_secs.max(1)),
    )
    .start(shutdown.clone());

    // AppState 構築
    let state = AppState::new(config, accounts, tokens, notifier, clock).map_err(|e| {
        tracing::error!(error = ?e, "AppState の構築に失敗");
        anyhow::anyhow!("Failed to create AppState: {}", e)
    })?;

    let app = create_router(state).map_err(|e| {
        tracing::error!(error = ?e, "Router の構築に失敗");
        anyhow::anyhow!("Failed to create router: {}", e)
    })?;

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応（レート制限のキーにクライアントIPを使うため接続情報を付与）
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| {
        tracing::error!(error = ?e, "サーバーエラー");
        anyhow::anyhow!("Server error: {}", e)
    })?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = ?e, "トークン掃除タスクの終了待ちに失敗");
    }

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pathpilot_auth=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// DATABASE_URL があれば PostgreSQL、なければインメモリのストアを構築
async fn build_stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn AccountRepository>, Arc<dyn ResetTokenStore>)> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL 未設定: インメモリストアを使用（再起動でデータは消えます）");
        let accounts: Arc<dyn AccountRepository> = Arc::new(InMemoryAccountRepository::new());
        let tokens: Arc<dyn ResetTokenStore> = Arc::new(InMemoryResetTokenStore::new());
        return Ok((accounts, tokens));
    };

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    sqlx::migrate!().run(&db_pool).await.map_err(|e| {
        tracing::error!(error = ?e, "マイグレーションに失敗");
        anyhow::anyhow!("Failed to run migrations: {}", e)
    })?;

    tracing::info!("データベース接続完了");

    let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(db_pool.clone()));
    let tokens: Arc<dyn ResetTokenStore> = Arc::new(PgResetTokenStore::new(db_pool));
    Ok((accounts, tokens))
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
