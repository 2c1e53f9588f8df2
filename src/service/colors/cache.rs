use moka::future::Cache;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 请求指纹 -> 主色列表
///
/// 写入后固定 TTL 过期，读取不续期，没有手动失效接口。
#[derive(Clone)]
pub struct ResultCache {
    cache: Cache<String, Vec<String>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Vec<String>> {
        self.cache.get(fingerprint).await
    }

    pub async fn insert(&self, fingerprint: String, colors: Vec<String>) {
        self.cache.insert(fingerprint, colors).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// 定期清理已过期的条目
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.run_pending_tasks().await;
                tracing::debug!("结果缓存清理完成，剩余 {} 条", cache.entry_count());
            }
        })
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}
