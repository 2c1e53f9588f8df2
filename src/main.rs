mod api;
mod config;
mod error;
mod model;
mod service;
mod util;
#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};
use crate::config::{AppConfig, ConfigOverrides};
use crate::service::colors::{ColorService, ResultCache};
use crate::service::extract::KmeansExtractor;
use crate::service::source::CachedFetcher;

#[derive(Debug, Parser)]
#[command(version, about = "Find the prominent colors of an image")]
struct Cli {
    /// 配置文件路径，文件不存在时使用默认值
    #[arg(long, default_value = "config.toml", global = true)]
    config: String,

    /// port number for the server to run on
    #[arg(long, global = true)]
    port: Option<u16>,

    /// maximum request body size in mb
    #[arg(long = "max-req-body-size", global = true)]
    max_req_body_size: Option<u64>,

    /// maximum prominent colors that can be used to limit the user's choice
    #[arg(long, global = true)]
    max_prominent_colors: Option<usize>,

    /// disk cache directory for images fetched from urls
    #[arg(long, global = true)]
    disk_cache_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 启动 HTTP 服务（默认）
    Serve,
    /// 提取本地图片的主色并输出 JSON
    Extract {
        path: PathBuf,
        #[arg(short = 'n', long, default_value_t = 0)]
        colors: usize,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            max_request_body_size_mb: self.max_req_body_size,
            max_prominent_colors: self.max_prominent_colors,
            disk_cache_dir: self.disk_cache_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = AppConfig::load(&cli.config, &cli.overrides())?;

    // guard 需要活到进程结束，否则文件日志会丢
    let _guard = init_tracing(&config.log.dir)?;

    tracing::info!(
        "using {} as cache dir while fetching images from urls",
        config.cache.disk_cache_dir.display()
    );

    let cache = ResultCache::new(config.cache.ttl(), config.cache.max_entries);
    let fetcher = CachedFetcher::new(
        config.cache.disk_cache_dir.clone(),
        Duration::from_secs(config.fetch.timeout_secs),
    )
    .context("Failed to build http client")?;
    let colors = ColorService::new(
        cache.clone(),
        Arc::new(fetcher),
        Arc::new(KmeansExtractor::default()),
        &config.limits,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Extract { path, colors: count } => {
            let response = colors.extract_file(&path, count).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if response.is_error() {
                anyhow::bail!("failed to extract prominent colors from {}", path.display());
            }
        }
        Command::Serve => {
            let _sweeper = cache.spawn_sweeper(config.cache.sweep_interval());

            let addr = config.bind_addr();
            let app_state = api::AppState::new(config, colors);
            let app = api::routes::create_router(app_state);

            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            tracing::info!("Server listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
    }

    // 按日期滚动
    let file_appender = tracing_appender::rolling::daily(log_dir, "prominent_colors.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // 控制台输出层（带颜色）
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_filter(env_filter());

    // 文件输出层（无颜色）
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭服务");
}
