use axum::{
    Router,
    routing::{get, post},
};
use http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::handlers;
use crate::rate_limit::create_ip_rate_limiter;
use crate::state::AppState;

/// Router の構築
///
/// `/api` 配下はすべてクライアントIP単位でレート制限される。
/// 受け付けには `into_make_service_with_connect_info::<SocketAddr>()` が必要。
pub fn create_router(state: AppState) -> Result<Router, AppError> {
    let auth_routes = Router::new()
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route("/forgot-password", post(handlers::forgot_password))
        .route(
            "/verify-reset-token/{token}",
            get(handlers::verify_reset_token),
        )
        .route("/reset-password", post(handlers::reset_password))
        .route("/change-password", post(handlers::change_password))
        .route("/validate-password", post(handlers::validate_password))
        .route(
            "/password-requirements",
            get(handlers::password_requirements),
        )
        .route("/password-suggestion", get(handlers::password_suggestion));

    let cors = cors_layer(&state.config.frontend_url);
    let rate_limiter = create_ip_rate_limiter(&state.config)?;

    let router = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .nest("/api/auth", auth_routes)
        .layer(rate_limiter)
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

/// フロントエンドのオリジンのみ許可
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = ?e, frontend_url = %frontend_url, "FRONTEND_URL が不正なため CORS を許可しない");
            cors
        }
    }
}
