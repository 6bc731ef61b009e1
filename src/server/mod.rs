pub mod assets;
pub mod auth;
pub mod command;
pub mod error;
pub mod files;
pub mod http;

use crate::capture::pressure::PressureGauge;
use crate::capture::service::{CaptureError, CaptureService, CaptureSettings};
use crate::capture::source::{CaptureBackend, CaptureToken};
use crate::input::CommandExecutor;
use crate::transport::cache::FrameCache;
use crate::transport::hub::BroadcastHub;
use crate::transport::websocket::StreamContext;
use auth::Credentials;
use axum::extract::FromRef;
use files::FileTransferSettings;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub stream: Arc<StreamContext>,
    pub executor: Arc<dyn CommandExecutor>,
    pub file_transfer: bool,
}

impl FromRef<AppState> for Arc<StreamContext> {
    fn from_ref(state: &AppState) -> Self {
        state.stream.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub credentials: Option<Credentials>,
    pub file_transfer: Option<FileTransferSettings>,
    pub send_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("无法监听 {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("无法创建存储目录 {path:?}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// 采集路径的组成部分
pub struct CapturePipeline {
    pub backend: Arc<dyn CaptureBackend>,
    pub pressure: Arc<dyn PressureGauge>,
    pub settings: CaptureSettings,
}

/// 远程控制服务器：HTTP 路由、串流 Hub 与采集服务的生命周期
pub struct RemoteServer {
    local_addr: SocketAddr,
    capture: Arc<CaptureService>,
    hub: Arc<BroadcastHub>,
    /// 只控制 accept 循环
    listener_shutdown: CancellationToken,
    /// 已建立的连接、客户端写任务与广播任务
    shutdown: CancellationToken,
    server_task: JoinHandle<()>,
    pump_task: JoinHandle<()>,
}

impl RemoteServer {
    /// 绑定端口并开始服务；绑定失败直接返回错误，不会留下半启动的服务器
    pub async fn start(
        settings: ServerSettings,
        pipeline: CapturePipeline,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, ServerError> {
        if let Some(files) = &settings.file_transfer {
            tokio::fs::create_dir_all(&files.storage_dir)
                .await
                .map_err(|source| ServerError::Storage {
                    path: files.storage_dir.clone(),
                    source,
                })?;
            log::info!("文件传输已启用，存储目录: {}", files.storage_dir.display());
        }

        let listener = TcpListener::bind(settings.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: settings.bind,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: settings.bind,
            source,
        })?;

        let cache = Arc::new(FrameCache::new());
        let hub = Arc::new(BroadcastHub::new(cache.clone()));
        let capture = Arc::new(CaptureService::new(
            pipeline.backend,
            pipeline.pressure,
            cache,
            pipeline.settings,
        ));

        let shutdown = CancellationToken::new();
        let listener_shutdown = shutdown.child_token();

        let state = AppState {
            stream: Arc::new(StreamContext {
                hub: hub.clone(),
                send_timeout: settings.send_timeout,
                shutdown: shutdown.clone(),
            }),
            executor,
            file_transfer: settings.file_transfer.is_some(),
        };
        let app = http::build_router(
            state,
            settings.credentials.as_ref(),
            settings.file_transfer.as_ref(),
        );

        let pump_task = tokio::spawn(hub.clone().run(shutdown.clone()));
        let server_task = tokio::spawn(http::run_server(listener, app, listener_shutdown.clone()));

        log::info!(
            "HTTP 服务器监听: http://{}{}",
            local_addr,
            if settings.credentials.is_some() { " (需要认证)" } else { "" }
        );

        Ok(Self {
            local_addr,
            capture,
            hub,
            listener_shutdown,
            shutdown,
            server_task,
            pump_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn capture(&self) -> &Arc<CaptureService> {
        &self.capture
    }

    /// 采集开始信号，携带平台授权凭据
    pub fn start_capture(&self, token: &CaptureToken) -> Result<(), CaptureError> {
        self.capture.start(token)
    }

    pub fn stop_capture(&self) {
        self.capture.stop();
    }

    /// 停止服务器
    ///
    /// 顺序：停止接受新连接，停止采集调度，关闭全部客户端，释放帧源，
    /// 最后关闭已建立的 HTTP 连接与广播任务并清空 Frame Cache。
    pub async fn stop(self) {
        log::info!("正在停止服务器...");
        self.listener_shutdown.cancel();

        let capture = self.capture.clone();
        let source = match tokio::task::spawn_blocking(move || capture.halt()).await {
            Ok(source) => source,
            Err(e) => {
                log::error!("停止采集任务异常: {}", e);
                None
            }
        };

        let closed = self.hub.close_all();
        log::info!("已关闭 {} 个串流客户端", closed);

        if source.is_some() {
            drop(source);
            log::info!("帧源已释放");
        }

        self.shutdown.cancel();
        if let Err(e) = self.server_task.await {
            log::error!("HTTP 任务异常退出: {}", e);
        }
        if let Err(e) = self.pump_task.await {
            log::error!("广播任务异常退出: {}", e);
        }

        // 关闭过程中才完成升级的连接
        let late = self.hub.close_all();
        if late > 0 {
            log::debug!("关闭了 {} 个迟到的客户端", late);
        }
        self.hub.cache().clear();
        log::info!("服务器已停止");
    }
}
