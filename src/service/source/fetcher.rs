use reqwest::header::{CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use crate::error::AppResult;
use crate::util::hash::digest_str;

/// 带磁盘缓存的 HTTP 下载器
///
/// 按 URL 的 SHA256 作为文件名，缓存响应体和 ETag / Last-Modified，
/// 再次请求时带上条件头，服务端返回 304 就直接读本地文件。
#[derive(Debug, Clone)]
pub struct CachedFetcher {
    client: Client,
    cache_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheMeta {
    etag: Option<String>,
    last_modified: Option<String>,
    content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub from_cache: bool,
}

impl CachedFetcher {
    pub fn new(cache_dir: PathBuf, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, cache_dir })
    }

    /// 最多读取 `max_bytes` 字节，超出部分不再下载
    pub async fn fetch(&self, url: &str, max_bytes: u64) -> AppResult<Fetched> {
        let key = digest_str(url);
        let body_path = self.cache_dir.join(format!("{}.body", key));
        let meta_path = self.cache_dir.join(format!("{}.json", key));

        let cached = read_meta(&meta_path).await;

        let mut request = self.client.get(url);
        if let Some(meta) = &cached {
            if let Some(etag) = &meta.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &meta.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let mut response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            if let Some(meta) = cached {
                match tokio::fs::read(&body_path).await {
                    Ok(mut body) => {
                        debug!("磁盘缓存命中: {}", url);
                        body.truncate(max_bytes as usize);
                        return Ok(Fetched {
                            content_type: meta.content_type,
                            body,
                            from_cache: true,
                        });
                    }
                    Err(e) => {
                        // 缓存文件丢了，去掉条件头重新下载
                        warn!("读取缓存文件 {:?} 失败: {}", body_path, e);
                        let _ = tokio::fs::remove_file(&meta_path).await;
                        response = self.client.get(url).send().await?;
                    }
                }
            }
        }

        let status = response.status();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let meta = CacheMeta {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
            content_type: header(CONTENT_TYPE),
        };

        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            let remaining = max_bytes as usize - body.len();
            if chunk.len() > remaining {
                body.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        if status == StatusCode::OK && !truncated && (meta.etag.is_some() || meta.last_modified.is_some()) {
            if let Err(e) = write_entry(&self.cache_dir, &body_path, &meta_path, &body, &meta).await {
                warn!("写入磁盘缓存失败 {}: {}", url, e);
            }
        }

        Ok(Fetched {
            content_type: meta.content_type,
            body,
            from_cache: false,
        })
    }
}

async fn read_meta(path: &Path) -> Option<CacheMeta> {
    let data = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&data).ok()
}

async fn write_entry(
    dir: &Path,
    body_path: &Path,
    meta_path: &Path,
    body: &[u8],
    meta: &CacheMeta,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(body_path, body).await?;
    // 元数据最后写，存在即代表响应体完整
    tokio::fs::write(meta_path, serde_json::to_vec(meta)?).await?;
    Ok(())
}
