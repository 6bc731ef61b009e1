use clap::Parser;
use std::sync::Arc;
use webremote::capture::adb::AdbBackend;
use webremote::capture::pattern::PatternBackend;
use webremote::capture::pressure::SystemMemoryGauge;
use webremote::capture::source::{CaptureBackend, CaptureToken};
use webremote::config::{CaptureKind, Config, ExecutorKind};
use webremote::input::CommandExecutor;
use webremote::input::adb::AdbExecutor;
use webremote::input::logging::LoggingExecutor;
use webremote::server::http::STREAM_PATH;
use webremote::server::{CapturePipeline, RemoteServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logger with default info level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!("=== 远程控制服务器启动 ===");
    log::debug!("{:?}", config);

    let settings = config.server_settings()?;

    let backend: Arc<dyn CaptureBackend> = match config.capture {
        CaptureKind::Pattern => Arc::new(PatternBackend::new(config.width, config.height)),
        CaptureKind::Adb => Arc::new(AdbBackend::new(
            config.adb_path.clone(),
            config.width,
            config.height,
        )),
    };

    let executor: Arc<dyn CommandExecutor> = match config.executor {
        ExecutorKind::Log => Arc::new(LoggingExecutor),
        ExecutorKind::Adb => {
            let program = config.adb_path.clone();
            let serial = config.adb_serial.clone();
            let frame_size = (config.width, config.height);
            let executor = tokio::task::spawn_blocking(move || {
                AdbExecutor::new(program, serial, frame_size)
            })
            .await?;
            Arc::new(executor)
        }
    };

    let pipeline = CapturePipeline {
        backend,
        pressure: Arc::new(SystemMemoryGauge::new()),
        settings: config.capture_settings(),
    };
    let server = RemoteServer::start(settings, pipeline, executor).await?;

    let addr = server.local_addr();
    log::info!("服务已启动！");
    log::info!("  Web 界面: http://{}", addr);
    log::info!("  串流: ws://{}{}", addr, STREAM_PATH);
    if addr.ip().is_unspecified() {
        log::info!("  (监听所有网卡，请使用本机局域网地址访问)");
    }

    // 采集启动失败时仍然保持服务，页面可以显示控制按钮
    let token = CaptureToken::new(config.capture_token.clone());
    let capture = server.capture().clone();
    match tokio::task::spawn_blocking(move || capture.start(&token)).await? {
        Ok(()) => {}
        Err(e) => log::error!("{}", e),
    }

    tokio::signal::ctrl_c().await?;
    log::info!("收到退出信号");
    server.stop().await;
    Ok(())
}
