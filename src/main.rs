#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use tracing::info;
use std::sync::Arc;
use std::net::SocketAddr;
use chemview::{
    chem::NativeToolkit,
    task::{DockerOsra, TaskRegistry},
    utils::logger,
    AppContext, Settings, DOCKER_BIN, HOST, LOG_PATH, OSRA_IMAGE, PORT,
};
use std::fs;

#[tokio::main]
async fn main() -> Result<()> {
    chemview::init_env();

    // 初始化日志系统
    let _guard = logger::init(LOG_PATH.to_string())?;
    info!("Starting chemview ({})...", env!("GIT_HASH"));

    // 创建必要的目录
    let settings = Settings::from_env();
    fs::create_dir_all(&settings.upload_dir)?;

    // 初始化识别后端
    info!("Initializing recognition backend ({} {})...", DOCKER_BIN.as_str(), OSRA_IMAGE.as_str());
    let backend = DockerOsra::new(&DOCKER_BIN, &OSRA_IMAGE, &settings.upload_dir)?;

    info!(
        "Recognition timeout {}s, heartbeat {}s, stop timeout {}s",
        settings.recognition_timeout.as_secs(),
        settings.heartbeat_interval.as_secs(),
        settings.stop_timeout.as_secs()
    );

    // 创建应用上下文
    let ctx = Arc::new(AppContext {
        settings,
        registry: Arc::new(TaskRegistry::new()),
        backend: Arc::new(backend),
        toolkit: Arc::new(NativeToolkit::new()),
    });

    // 配置服务器地址
    let addr: SocketAddr = format!("{}:{}", HOST.as_str(), *PORT).parse()?;
    info!("Starting HTTP server at http://{}", addr);

    // 启动 HTTP 服务器
    match chemview::web::start_server(ctx.clone(), addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    info!("Shutting down...");
    Ok(())
}
