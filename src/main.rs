// src/main.rs

use anyhow::Context;
use axum::serve;
use clap::Parser;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod api;
mod backend;
mod config;
mod error;
mod logging;
mod model;
mod overlay;
mod runtime;
mod scheduler;

use api::snapshot::{OverlaySnapshot, SnapshotRenderer};
use api::AppState;
use backend::client::{HttpAdFetcher, HttpTelemetry};
use backend::host_webhook::HttpHostBridge;
use backend::mock::{serve_on, GeneratedInventory, MockBackend};
use config::OverlayConfig;
use error::ConfigError;
use logging::runtime_logger::RuntimeLogger;
use model::adapters::{FileInventoryAdapter, InventoryAdapter};
use overlay::host_bridge::HostLink;
use overlay::AdOverlay;
use runtime::{run_overlay, OverlayChannels};

#[derive(Parser, Debug)]
#[command(version = "1.0", about = "Banner / interstitial ad overlay service for WebGL games")]
struct CliArgs {
    #[arg(short, long, default_value_t = 8090)]
    port: u16,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    /// JSON 配置文件，命令行参数覆盖其中的同名项
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    rotation_interval_ms: Option<u64>,
    #[arg(long)]
    fullscreen_duration_ms: Option<u64>,
    #[arg(long)]
    game_over_threshold: Option<u32>,
    #[arg(long)]
    retry_attempts: Option<u32>,
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    #[arg(long)]
    fallback_image_url: Option<String>,
    #[arg(long)]
    fallback_target_url: Option<String>,
    /// 宿主页面的全局回调地址（运行时未登记时使用）
    #[arg(long)]
    host_callback_url: Option<String>,
    /// 同进程启动模拟后端
    #[arg(long)]
    mock_backend_port: Option<u16>,
    /// 模拟后端前 N 次列表请求返回 503
    #[arg(long, default_value_t = 0)]
    mock_failures: u32,
    #[arg(long, requires = "mock_fullscreen")]
    mock_banners: Option<String>,
    #[arg(long, requires = "mock_banners")]
    mock_fullscreen: Option<String>,
}

impl CliArgs {
    fn overlay_config(&self) -> Result<OverlayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => OverlayConfig::from_file(path)?,
            None => OverlayConfig::default(),
        };
        match (&self.api_url, self.mock_backend_port) {
            (Some(url), _) => config.api_url = url.clone(),
            (None, Some(port)) => config.api_url = format!("http://127.0.0.1:{}", port),
            (None, None) => {}
        }
        if let Some(v) = self.rotation_interval_ms {
            config.banner_rotation_interval_ms = v;
        }
        if let Some(v) = self.fullscreen_duration_ms {
            config.fullscreen_duration_ms = v;
        }
        if let Some(v) = self.game_over_threshold {
            config.game_over_threshold = v;
        }
        if let Some(v) = self.retry_attempts {
            config.retry_attempts = v;
        }
        if let Some(v) = self.retry_delay_ms {
            config.retry_delay_ms = v;
        }
        if let Some(v) = &self.fallback_image_url {
            config.fallback_image_url = v.clone();
        }
        if let Some(v) = &self.fallback_target_url {
            config.fallback_target_url = v.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化全局 tracing 日志
    let log_file = rolling::hourly(&args.log_dir, "overlay_log.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber)
        .context("unable to set global tracing subscriber")?;

    let config = args.overlay_config().context("invalid overlay configuration")?;
    info!(api_url = %config.api_url, "ad overlay service starting on port {}", args.port);

    // 运行日志记录器（服务运行状态、调试、错误等）
    let runtime_logger = RuntimeLogger::new(&args.log_dir, "overlay_runtime", 1000, 100, 1000);
    runtime_logger.log("INFO", "ad overlay service is starting...").await;

    let mut servers = Vec::new();

    // 模拟后端：指定了库存文件就读文件，否则随机生成
    if let Some(port) = args.mock_backend_port {
        let inventory: Box<dyn InventoryAdapter> = match (&args.mock_banners, &args.mock_fullscreen) {
            (Some(banners), Some(fullscreen)) => Box::new(FileInventoryAdapter::new(banners, fullscreen)),
            _ => Box::new(GeneratedInventory::new()),
        };
        let backend = Arc::new(MockBackend::new(inventory.as_ref(), args.mock_failures));
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("unable to bind mock backend on {}", addr))?;
        runtime_logger.log("INFO", &format!("Mock ad backend running at http://{}", addr)).await;
        servers.push(tokio::spawn(async move {
            if let Err(e) = serve_on(listener, backend).await {
                error!("mock backend stopped: {}", e);
            }
        }));
    }

    let (command_tx, command_rx) = mpsc::channel(64);
    let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (snapshot_tx, _snapshot_rx) = watch::channel(OverlaySnapshot::default());
    let snapshot = Arc::new(snapshot_tx);

    let mut host = HostLink::new(config.host.clone());
    if let Some(url) = &args.host_callback_url {
        let bridge = HttpHostBridge::new(url).context("invalid --host-callback-url")?;
        host = host.with_global_callback(Box::new(bridge));
    }
    let overlay = AdOverlay::new(
        config.clone(),
        Box::new(SnapshotRenderer::new(snapshot.clone())),
        Box::new(HttpTelemetry::new(&config)),
        Box::new(HttpAdFetcher::new(&config, fetch_tx)),
        host,
        StdRng::from_entropy(),
    );

    let state = Arc::new(AppState {
        commands: command_tx,
        snapshot,
        runtime_logger: runtime_logger.clone(),
    });
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind command API on {}", addr))?;
    runtime_logger.log("INFO", &format!("ad overlay API running at http://{}", addr)).await;
    servers.push(tokio::spawn(async move {
        if let Err(e) = serve(listener, api::router(state)).await {
            error!("command API stopped: {}", e);
        }
    }));

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("unable to listen for ctrl-c: {}", e);
        }
        let _ = shutdown_tx.send(());
    });

    // 浮层状态只在主任务上读写
    let channels = OverlayChannels {
        commands: command_rx,
        fetches: fetch_rx,
        shutdown: shutdown_rx,
    };
    run_overlay(overlay, channels, runtime_logger.clone()).await;

    runtime_logger.log("INFO", "Shutting down gracefully...").await;
    for server in &servers {
        server.abort();
    }
    join_all(servers).await;
    runtime_logger.log("INFO", "ad overlay service shut down.").await;
    runtime_logger.shutdown().await;
    Ok(())
}
