use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tracing::warn;
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::model::colors::{ColorsRequest, ColorsResponse};

/// POST / 返回图片主色
pub async fn prominent_colors(State(state): State<AppState>, body: Body) -> Response {
    let response = match read_request(body, state.colors.max_body_size()).await {
        Ok(request) => state.colors.find_prominent_colors(request).await,
        Err(e) => ColorsResponse::failed(&e),
    };

    response.into_response()
}

pub async fn health() -> &'static str {
    "ok"
}

async fn read_request(body: Body, limit: u64) -> AppResult<ColorsRequest> {
    let raw = read_body(body, limit).await?;

    ColorsRequest::from_body(&raw).map_err(|e| {
        let detail = e.to_string();
        let log_detail = detail.clone();
        // 原始请求体可能很大，放到后台任务里记录，不阻塞响应
        tokio::spawn(async move {
            warn!("could not decode request body, failed with '{}'", log_detail);
            warn!("{}", String::from_utf8_lossy(&raw));
        });
        AppError::Serialization(detail)
    })
}

/// 最多保留 `limit` 字节，超出后继续把剩余部分读完丢弃
async fn read_body(body: Body, limit: u64) -> AppResult<Vec<u8>> {
    let mut stream = body.into_data_stream();
    let mut raw = Vec::new();
    let mut overflow = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(AppError::other)?;
        if overflow {
            continue;
        }
        if (raw.len() + chunk.len()) as u64 > limit {
            overflow = true;
            raw = Vec::new();
            continue;
        }
        raw.extend_from_slice(&chunk);
    }

    if overflow {
        return Err(AppError::size_limit(limit));
    }
    Ok(raw)
}

impl IntoResponse for ColorsResponse {
    fn into_response(self) -> Response {
        let bytes = match serde_json::to_vec(&self) {
            Ok(bytes) => bytes,
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {}", e)).into_response();
            }
        };

        let status = if self.is_error() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };

        let mut response = (status, bytes).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::config::AppConfig;
    use crate::error::ErrorKind;
    use crate::service::colors::{ColorService, ResultCache};
    use crate::service::extract::{ColorExtractor, KmeansExtractor, MockColorExtractor};
    use crate::service::source::CachedFetcher;
    use crate::test_utils::red_png_base64;
    use axum::http::{Method, Request};
    use axum::Router;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_with(extractor: Arc<dyn ColorExtractor>) -> Router {
        let mut config = AppConfig::default();
        config.cache.disk_cache_dir = std::env::temp_dir().join("prominent-colors-handler-tests");
        config.server.request_timeout_secs = 10;
        let fetcher = CachedFetcher::new(config.cache.disk_cache_dir.clone(), Duration::from_secs(5)).unwrap();
        let colors = ColorService::new(
            ResultCache::new(config.cache.ttl(), config.cache.max_entries),
            Arc::new(fetcher),
            extractor,
            &config.limits,
        );
        create_router(AppState::new(config, colors))
    }

    fn app() -> Router {
        app_with(Arc::new(KmeansExtractor::default()))
    }

    fn post_json(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, ColorsResponse) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn red_png_base64_returns_single_color() {
        let body = serde_json::json!({
            "type": "base64",
            "value": red_png_base64(),
            "num_prominent_colors": 3,
        });
        let (status, res) = call(app(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res, ColorsResponse::colors(vec!["#ff0000".to_string()]));
    }

    #[tokio::test]
    async fn success_sets_json_and_cors_headers() {
        let body = serde_json::json!({"type": "base64", "value": red_png_base64()});
        let response = app().oneshot(post_json(body.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn malformed_json_is_serialization_error() {
        for body in [
            r#"{"type":"base64","value":"#,
            r#"{"type":"base64","value":42}"#,
            r#"{"type":"url","value":"x","num_prominent_colors":"many"}"#,
        ] {
            let (status, res) = call(app(), post_json(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(res.prominent_colors.is_none());
            let err = res.error.unwrap();
            assert_eq!(err.kind, ErrorKind::Serialization);
            assert!(err.message.starts_with("could not decode request body, failed with '"));
        }
    }

    #[tokio::test]
    async fn oversize_body_is_too_large() {
        let body = serde_json::json!({"type": "base64", "value": "A".repeat(2 << 20)});
        let (status, res) = call(app(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.error.unwrap().kind, ErrorKind::SizeTooLarge);
    }

    #[tokio::test]
    async fn text_payload_is_unknown_format() {
        use base64::Engine;
        let value = base64::engine::general_purpose::STANDARD.encode("hello, this is a text file\n");
        let body = serde_json::json!({"type": "base64", "value": value});
        let (status, res) = call(app(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.error.unwrap().kind, ErrorKind::UnknownDataFormat);
    }

    #[tokio::test]
    async fn url_to_text_file_is_unknown_format() {
        let server = MockServer::start().await;
        // 不带 Content-Type，由嗅探判断
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"plain old text\n".to_vec(), ""))
            .mount(&server)
            .await;

        let body = serde_json::json!({
            "type": "url",
            "value": format!("{}/not-an-image.txt", server.uri()),
        });
        let (status, res) = call(app(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.error.unwrap().kind, ErrorKind::UnknownDataFormat);
    }

    #[tokio::test]
    async fn file_upload_type_is_other_error() {
        let body = serde_json::json!({"type": "file-upload", "value": "/etc/passwd"});
        let (status, res) = call(app(), post_json(body.to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let err = res.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Other);
        assert_eq!(err.message, "requested type file-upload is not implemented for http requests");
    }

    #[tokio::test]
    async fn repeated_request_hits_cache() {
        let mut mock = MockColorExtractor::new();
        mock.expect_extract()
            .times(1)
            .returning(|_, _| Ok(vec!["#aabbcc".to_string()]));
        let app = app_with(Arc::new(mock));

        let body = serde_json::json!({"type": "base64", "value": red_png_base64(), "num_prominent_colors": 2})
            .to_string();
        let first = app.clone().oneshot(post_json(body.clone())).await.unwrap();
        let first = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let second = app.oneshot(post_json(body)).await.unwrap();
        let second = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn non_json_content_type_is_rejected_upstream() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
