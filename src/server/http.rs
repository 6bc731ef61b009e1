use super::AppState;
use super::auth::{CredentialVerifier, Credentials, require_basic_auth};
use super::error::RouteError;
use super::files::{FileStore, FileTransferSettings};
use super::{assets, command, files};
use crate::transport::websocket::websocket_upgrade;
use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

/// 唯一接受 WebSocket 升级的路径
pub const STREAM_PATH: &str = "/screen";

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; img-src 'self' blob: data:; connect-src 'self' ws: wss:; style-src 'self' 'unsafe-inline'; script-src 'self';";

/// accept 出错后的退避时间，避免文件描述符耗尽时空转
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub fn build_router(
    state: AppState,
    credentials: Option<&Credentials>,
    file_transfer: Option<&FileTransferSettings>,
) -> Router {
    let mut router = Router::new()
        .route("/", get(assets::index))
        .route("/control.js", get(assets::control_js))
        .route("/style.css", get(assets::style_css))
        .route("/screen.jpg", get(assets::latest_frame))
        .route("/api/config", get(assets::client_config))
        .route("/api/command", post(command::handle_command))
        .route(STREAM_PATH, get(websocket_upgrade))
        .with_state(state);

    if let Some(settings) = file_transfer {
        let store = Arc::new(FileStore::new(settings.storage_dir.clone()));
        router = router.merge(files::router(store, settings));
    }
    router = router.fallback(not_found);

    // 认证在外层，先于升级路径检查
    router = router.layer(middleware::from_fn(reject_stray_upgrade));
    if let Some(credentials) = credentials {
        let verifier = Arc::new(CredentialVerifier::new(credentials));
        router = router.layer(middleware::from_fn_with_state(verifier, require_basic_auth));
    }

    router.layer(SetResponseHeaderLayer::if_not_present(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    ))
}

async fn not_found() -> RouteError {
    RouteError::NotFound("Not Found".to_string())
}

fn is_websocket_upgrade(req: &Request) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// 非串流路径上的升级请求直接拒绝
async fn reject_stray_upgrade(req: Request, next: Next) -> Result<Response, RouteError> {
    if is_websocket_upgrade(&req) && req.uri().path() != STREAM_PATH {
        log::warn!("拒绝未知路径上的 WebSocket 升级: {}", req.uri().path());
        return Err(RouteError::BadRequest("Unsupported upgrade path".to_string()));
    }
    Ok(next.run(req).await)
}

/// 在已绑定的监听器上接受连接，直到 `shutdown` 触发
///
/// 触发后不再接受新连接，已建立的连接收到优雅关闭信号。
pub async fn run_server(listener: TcpListener, app: Router, shutdown: CancellationToken) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    log::warn!("接受连接失败: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let app = app.clone();
        let shutdown = shutdown.clone();

        tokio::task::spawn(async move {
            let io = TokioIo::new(stream);
            let service = TowerToHyperService::new(app);
            let conn = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades();
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(err) = result {
                log::debug!("HTTP 连接错误: {}", err);
            }
        });
    }
    log::info!("HTTP 服务已停止接受连接");
}
