use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::read::DecoderReader;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use crate::error::{AppError, AppResult};
use crate::model::colors::{ColorsRequest, UploadType};
use crate::service::source::CachedFetcher;

/// 图片字节流，校验和解码都在阻塞线程池里同步读取
pub type ByteStream = Box<dyn Read + Send>;

#[async_trait]
pub trait ImageSource: Send {
    async fn open(self: Box<Self>) -> AppResult<ByteStream>;
}

pub struct UrlSource {
    url: String,
    fetcher: Arc<CachedFetcher>,
    max_bytes: u64,
}

impl UrlSource {
    pub fn new(url: String, fetcher: Arc<CachedFetcher>, max_bytes: u64) -> Self {
        Self { url, fetcher, max_bytes }
    }
}

#[async_trait]
impl ImageSource for UrlSource {
    async fn open(self: Box<Self>) -> AppResult<ByteStream> {
        let fetched = self.fetcher.fetch(&self.url, self.max_bytes).await?;
        tracing::debug!(
            "fetched {} ({} bytes, from_cache={})",
            self.url,
            fetched.body.len(),
            fetched.from_cache
        );

        // 只是提前拦截，没有 Content-Type 时交给后面的嗅探
        if let Some(content_type) = fetched.content_type.as_deref().filter(|t| !t.is_empty()) {
            if !content_type.starts_with("image/") {
                return Err(AppError::Other(format!("{} may not be an image", content_type)));
            }
        }

        Ok(Box::new(Cursor::new(fetched.body)))
    }
}

pub struct Base64Source {
    data: String,
}

impl Base64Source {
    pub fn new(data: String) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ImageSource for Base64Source {
    async fn open(self: Box<Self>) -> AppResult<ByteStream> {
        let reader = SkipLineBreaks::new(Cursor::new(self.data.into_bytes()));
        Ok(Box::new(DecoderReader::new(reader, &STANDARD)))
    }
}

/// 过滤掉 `\r` / `\n`，按 76 列换行的 base64 也能直接流式解码
pub struct SkipLineBreaks<R> {
    inner: R,
}

impl<R: Read> SkipLineBreaks<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for SkipLineBreaks<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let b = buf[i];
                if b != b'\r' && b != b'\n' {
                    buf[kept] = b;
                    kept += 1;
                }
            }
            // 整段都是换行时继续读，返回 0 会被当成 EOF
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImageSource for FileSource {
    async fn open(self: Box<Self>) -> AppResult<ByteStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file.into_std().await))
    }
}

/// HTTP 请求只支持 url 和 base64，其余类型在任何 I/O 之前拒绝
pub fn resolve(
    request: &ColorsRequest,
    fetcher: &Arc<CachedFetcher>,
    max_bytes: u64,
) -> AppResult<Box<dyn ImageSource>> {
    match &request.upload_type {
        UploadType::Url => Ok(Box::new(UrlSource::new(
            request.value.clone(),
            fetcher.clone(),
            max_bytes,
        ))),
        UploadType::Base64 => Ok(Box::new(Base64Source::new(request.value.clone()))),
        other => Err(AppError::Other(format!(
            "requested type {} is not implemented for http requests",
            other
        ))),
    }
}
