use axum::{middleware, Router, routing::get, routing::post};
use axum::http::Method;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{CorsLayer, Any};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use crate::api::AppState;
use crate::api::handlers;
use crate::api::middleware::{rate_limit, require_json};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let max_concurrent = state.config.server.max_concurrent_requests;

    let colors = Router::new()
        .route("/", post(handlers::colors::prominent_colors))
        .route_layer(middleware::from_fn(require_json))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let mut router = Router::new()
        .merge(colors)
        .route("/health", get(handlers::colors::health))
        .layer(TimeoutLayer::new(timeout));

    if let Some(limit) = max_concurrent {
        // 所有路由共享同一个并发上限
        router = router.layer(GlobalConcurrencyLimitLayer::new(limit));
    }

    router
        .layer(TraceLayer::new_for_http())
        // CORS 层放在最外面，预检请求不受限流和 Content-Type 校验影响
        .layer(cors)
        .with_state(state)
}
