use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use governor::middleware::StateInformationMiddleware;
use http::{HeaderValue, Response, StatusCode, header};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::PeerIpKeyExtractor,
};

use crate::config::Config;
use crate::error::AppError;

/// クライアントIP単位のレート制限
///
/// ウィンドウ内で `rate_limit_max_requests` 件まで即時に受け付け、
/// 以降は `window / max_requests` ごとに1件ずつ回復する。
pub fn create_ip_rate_limiter(
    config: &Config,
) -> Result<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body>, AppError> {
    let burst_size = config.rate_limit_max_requests.max(1);
    let window = Duration::from_secs(config.rate_limit_window_secs.max(1));
    let period = (window / burst_size).max(Duration::from_millis(1));

    let governor_conf = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst_size)
        .key_extractor(PeerIpKeyExtractor)
        .use_headers()
        .finish()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("invalid rate limiter config")))?;

    tracing::info!(
        burst_size,
        window_secs = window.as_secs(),
        "レート制限を設定"
    );

    Ok(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "レート制限超過");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "リクエストが多すぎます。しばらくしてから再度お試しください",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            tracing::error!("レート制限: クライアントIPを取得できません");
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部エラーが発生しました",
                None,
            )
        }
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                &msg.unwrap_or_else(|| "レート制限エラー".to_string()),
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

fn json_error_response(
    status: StatusCode,
    message: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({ "error": message });
    if let Some(retry_after) = retry_after {
        body["retryAfter"] = retry_after.into();
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(retry_after) = retry_after
        && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
    {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}
