use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::config::LimitsConfig;
use crate::error::{AppError, AppResult};
use crate::model::colors::{ColorsRequest, ColorsResponse};
use crate::service::colors::ResultCache;
use crate::service::extract::{decode, read_bounded, ColorExtractor};
use crate::service::source::{resolve, CachedFetcher, FileSource, ImageSource};

pub struct ColorService {
    cache: ResultCache,
    fetcher: Arc<CachedFetcher>,
    extractor: Arc<dyn ColorExtractor>,
    max_body_size: u64,
    max_colors: usize,
}

impl ColorService {
    pub fn new(
        cache: ResultCache,
        fetcher: Arc<CachedFetcher>,
        extractor: Arc<dyn ColorExtractor>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            extractor,
            max_body_size: limits.max_body_size_bytes(),
            max_colors: limits.max_prominent_colors,
        }
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    /// 先查缓存，未命中再走 获取 -> 校验 -> 提取，成功且非空才写回缓存
    pub async fn find_prominent_colors(&self, mut request: ColorsRequest) -> ColorsResponse {
        request.normalize(self.max_colors);
        let fingerprint = request.fingerprint();

        if let Some(colors) = self.cache.get(&fingerprint).await {
            if !colors.is_empty() {
                debug!("结果缓存命中 {}", fingerprint);
                return ColorsResponse::colors(colors);
            }
        }

        let result = match resolve(&request, &self.fetcher, self.max_body_size + 1) {
            Ok(source) => self.run_pipeline(source, request.prominent_colors).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(colors) => {
                if !colors.is_empty() {
                    self.cache.insert(fingerprint, colors.clone()).await;
                }
                ColorsResponse::colors(colors)
            }
            Err(e) => {
                warn!("获取主色失败 ({} 请求): {}", request.upload_type, e);
                ColorsResponse::failed(&e)
            }
        }
    }

    /// 本地文件，不经过结果缓存
    pub async fn extract_file(&self, path: &Path, count: usize) -> ColorsResponse {
        let count = if count == 0 || count > self.max_colors {
            self.max_colors
        } else {
            count
        };
        self.run_pipeline(Box::new(FileSource::new(path)), count)
            .await
            .into()
    }

    async fn run_pipeline(&self, source: Box<dyn ImageSource>, count: usize) -> AppResult<Vec<String>> {
        let stream = source.open().await?;
        let extractor = self.extractor.clone();
        let max_body_size = self.max_body_size;

        // 校验和聚类都是 CPU 密集型，放到阻塞线程池
        tokio::task::spawn_blocking(move || {
            let bytes = read_bounded(stream, max_body_size)?;
            let image = decode(&bytes)?;
            extractor.extract(&image, count)
        })
        .await
        .map_err(AppError::other)?
    }
}

impl std::fmt::Debug for ColorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorService")
            .field("cache", &self.cache)
            .field("max_body_size", &self.max_body_size)
            .field("max_colors", &self.max_colors)
            .finish()
    }
}
