use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use crate::config::AppConfig;
use crate::service::colors::ColorService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub colors: Arc<ColorService>,
    // 未配置 rate_limit_per_second 时不限流
    pub rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("colors", &self.colors)
            .field("rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}

impl AppState {
    pub fn new(config: AppConfig, colors: ColorService) -> Self {
        let rate_limiter = config
            .server
            .rate_limit_per_second
            .and_then(NonZeroU32::new)
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))));

        Self {
            config: Arc::new(config),
            colors: Arc::new(colors),
            rate_limiter,
        }
    }
}
