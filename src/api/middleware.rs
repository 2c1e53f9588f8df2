use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crate::api::AppState;

/// 只接受 application/json 请求体
pub async fn require_json(request: Request, next: Next) -> Response {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    if !is_json {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        )
            .into_response();
    }

    next.run(request).await
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!("请求过于频繁，已限流");
            return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use crate::api::{routes::create_router, AppState};
    use crate::config::AppConfig;
    use crate::service::colors::{ColorService, ResultCache};
    use crate::service::extract::KmeansExtractor;
    use crate::service::source::CachedFetcher;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(rate_limit_per_second: Option<u32>) -> AppState {
        let mut config = AppConfig::default();
        config.server.rate_limit_per_second = rate_limit_per_second;
        let fetcher = CachedFetcher::new(std::env::temp_dir(), Duration::from_secs(1)).unwrap();
        let colors = ColorService::new(
            ResultCache::new(config.cache.ttl(), 10),
            Arc::new(fetcher),
            Arc::new(KmeansExtractor::default()),
            &config.limits,
        );
        AppState::new(config, colors)
    }

    fn text_post() -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hi"))
            .unwrap()
    }

    #[tokio::test]
    async fn json_content_type_with_charset_is_accepted() {
        let app = create_router(state(None));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from("{"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        // 通过了 Content-Type 校验，由处理器返回解码错误
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn rate_limit_rejects_burst() {
        let app = create_router(state(Some(1)));
        let first = app.clone().oneshot(text_post()).await.unwrap();
        assert_eq!(first.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let second = app.oneshot(text_post()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn no_rate_limit_by_default() {
        let app = create_router(state(None));
        for _ in 0..5 {
            let response = app.clone().oneshot(text_post()).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
    }
}
