use config::{Config, Environment, File};
use serde::Deserialize;
use serde_aux::prelude::{deserialize_number_from_string, deserialize_option_number_from_string};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_timeouts"))]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub limits: LimitsConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    #[validate(nested)]
    pub fetch: FetchConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    #[validate(range(min = 1))]
    pub max_concurrent_requests: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_number_from_string")]
    #[validate(range(min = 1))]
    pub rate_limit_per_second: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            // 与旧服务的读写超时保持一致
            request_timeout_secs: 2,
            max_concurrent_requests: None,
            rate_limit_per_second: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 1024))]
    pub max_request_body_size_mb: u64,
    // k-means 的簇下标是 u8，上限远小于 256
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 64))]
    pub max_prominent_colors: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_size_mb: 1,
            max_prominent_colors: 5,
        }
    }
}

impl LimitsConfig {
    pub fn max_body_size_bytes(&self) -> u64 {
        self.max_request_body_size_mb << 20
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub max_entries: u64,
    pub disk_cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 600,
            max_entries: 10_000,
            disk_cache_dir: PathBuf::from("./cache"),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        // 不能超过单个请求的超时，否则下载超时永远不会先触发
        Self { timeout_secs: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

/// 命令行参数覆盖项，优先级高于配置文件和环境变量
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub max_request_body_size_mb: Option<u64>,
    pub max_prominent_colors: Option<usize>,
    pub disk_cache_dir: Option<String>,
}

impl AppConfig {
    /// 加载顺序：默认值 < 配置文件 < COLORS_* 环境变量 < 命令行参数
    pub fn load(path: &str, overrides: &ConfigOverrides) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("COLORS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option(
                "limits.max_request_body_size_mb",
                overrides.max_request_body_size_mb.map(|n| n as i64),
            )?
            .set_override_option(
                "limits.max_prominent_colors",
                overrides.max_prominent_colors.map(|n| n as i64),
            )?
            .set_override_option("cache.disk_cache_dir", overrides.disk_cache_dir.clone())?
            .build()
            .context("Failed to load config")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize config")?;

        app_config
            .validate()
            .context("Invalid config")?;

        app_config.cache.disk_cache_dir = absolutize(&app_config.cache.disk_cache_dir)?;

        Ok(app_config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn validate_timeouts(config: &AppConfig) -> Result<(), ValidationError> {
    if config.fetch.timeout_secs > config.server.request_timeout_secs {
        let mut err = ValidationError::new("fetch_timeout");
        err.message = Some("fetch.timeout_secs must not exceed server.request_timeout_secs".into());
        return Err(err);
    }
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to get current dir")?;
    Ok(cwd.join(path))
}
