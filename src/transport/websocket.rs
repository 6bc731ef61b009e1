use crate::protocol::frame::EncodedFrame;
use crate::transport::hub::{BroadcastHub, FrameSink, SinkClosed};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 默认单次写超时
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket 串流上下文
pub struct StreamContext {
    pub hub: Arc<BroadcastHub>,
    /// 单次写操作的上限，超时即视为客户端失效
    pub send_timeout: Duration,
    /// 服务器关闭时触发，所有客户端的关闭令牌都派生自它
    pub shutdown: CancellationToken,
}

/// 单个 WebSocket 客户端在 Hub 中的发送端
///
/// 每个客户端只有一个槽位：写任务来不及发送时，新帧覆盖旧帧，
/// 慢客户端只会丢帧，不会积压，也不会拖慢广播循环。
pub struct WsSink {
    slot: watch::Sender<Option<EncodedFrame>>,
    closer: CancellationToken,
}

impl WsSink {
    pub fn new(closer: CancellationToken) -> (Self, watch::Receiver<Option<EncodedFrame>>) {
        let (slot, rx) = watch::channel(None);
        (Self { slot, closer }, rx)
    }
}

impl FrameSink for WsSink {
    fn send(&self, frame: &EncodedFrame) -> Result<(), SinkClosed> {
        if self.closer.is_cancelled() || self.slot.is_closed() {
            return Err(SinkClosed);
        }

        // 序号不大于已投递帧的直接忽略，保证按发布顺序
        self.slot.send_if_modified(|current| match current {
            Some(existing) if existing.sequence >= frame.sequence => false,
            _ => {
                *current = Some(frame.clone());
                true
            }
        });
        Ok(())
    }

    fn close(&self) {
        self.closer.cancel();
    }
}

pub async fn websocket_upgrade(
    State(ctx): State<Arc<StreamContext>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client(ctx, socket))
}

/// 处理单个串流客户端连接
async fn handle_client(ctx: Arc<StreamContext>, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let closer = ctx.shutdown.child_token();
    let (sink, mut frame_rx) = WsSink::new(closer.clone());
    let client_id = ctx.hub.on_client_connected(Arc::new(sink));
    let send_timeout = ctx.send_timeout;

    // 发送任务：把槽位中的最新帧写给客户端
    let send_closer = closer.clone();
    let send_task = async move {
        loop {
            tokio::select! {
                _ = send_closer.cancelled() => {
                    let _ = tokio::time::timeout(send_timeout, ws_sender.send(Message::Close(None))).await;
                    break;
                }
                changed = frame_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let frame = frame_rx.borrow_and_update().clone();
                    let Some(frame) = frame else {
                        continue;
                    };

                    match tokio::time::timeout(
                        send_timeout,
                        ws_sender.send(Message::Binary(frame.bytes.clone())),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            log::debug!("客户端 #{} 写入失败: {}", client_id, e);
                            break;
                        }
                        Err(_) => {
                            log::warn!("客户端 #{} 写入超时 ({:?})，断开", client_id, send_timeout);
                            break;
                        }
                    }
                }
            }
        }
    };

    // 接收任务：正常情况下客户端不发数据，这里只负责发现连接关闭
    let recv_task = async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => log::debug!("客户端 #{} 消息: {}", client_id, text.as_str()),
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    closer.cancel();
    ctx.hub.on_client_disconnected(client_id);
}
