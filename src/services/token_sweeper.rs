use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::AppError;
use crate::repositories::ResetTokenStore;

/// 使用済み・期限切れのリセットトークンを定期的に削除する
pub struct TokenSweeper {
    store: Arc<dyn ResetTokenStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl TokenSweeper {
    pub fn new(store: Arc<dyn ResetTokenStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// 1回分の掃除を実行し、削除件数を返す
    pub async fn run_once(&self) -> Result<u64, AppError> {
        let removed = self.store.sweep(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "リセットトークン掃除");
        }
        Ok(removed)
    }

    /// バックグラウンドで定期実行（`shutdown` がキャンセルされるまで）
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "トークン掃除タスク開始");
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "トークン掃除に失敗");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            tracing::info!("トークン掃除タスク停止");
        })
    }
}
