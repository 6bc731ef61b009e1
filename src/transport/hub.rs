use crate::protocol::frame::EncodedFrame;
use crate::transport::cache::FrameCache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub type ClientId = u64;

/// 投递失败：客户端的发送通道已关闭
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client sink closed")]
pub struct SinkClosed;

/// 客户端的发送能力与关闭触发器
///
/// Hub 不负责连接的 I/O 生命周期，只持有这两个能力。
/// `send` 不得阻塞：慢客户端的写操作必须在各自的发送路径上完成。
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: &EncodedFrame) -> Result<(), SinkClosed>;

    fn close(&self);
}

/// 广播中心：维护在线客户端集合，把每个新帧推给所有人
///
/// 集合由互斥锁保护，广播时先取快照再在锁外逐个发送，
/// 发送中途有客户端断开也不会影响其他客户端。
pub struct BroadcastHub {
    clients: Mutex<HashMap<ClientId, Arc<dyn FrameSink>>>,
    next_id: AtomicU64,
    cache: Arc<FrameCache>,
}

impl BroadcastHub {
    pub fn new(cache: Arc<FrameCache>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    /// 新客户端加入；如已有缓存帧，立即单独发给它
    pub fn on_client_connected(&self, sink: Arc<dyn FrameSink>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_clients().insert(id, sink.clone());
        log::info!("串流客户端 #{} 已连接，当前 {} 个", id, self.client_count());

        if let Some(frame) = self.cache.current() {
            if sink.send(&frame).is_err() {
                log::warn!("向客户端 #{} 发送初始帧失败", id);
                self.drop_client(id);
            }
        }
        id
    }

    /// 移除客户端，可重复调用
    pub fn on_client_disconnected(&self, id: ClientId) {
        if self.lock_clients().remove(&id).is_some() {
            log::info!("串流客户端 #{} 已断开，剩余 {} 个", id, self.client_count());
        }
    }

    /// 推送一帧；发送失败的客户端被移除并关闭，错误不会传给调用方
    pub fn broadcast(&self, frame: &EncodedFrame) -> usize {
        let snapshot: Vec<(ClientId, Arc<dyn FrameSink>)> = self
            .lock_clients()
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sink) in snapshot {
            match sink.send(frame) {
                Ok(()) => delivered += 1,
                Err(SinkClosed) => {
                    log::warn!("向客户端 #{} 推送帧 {} 失败，移除", id, frame.sequence);
                    self.drop_client(id);
                }
            }
        }
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock_clients().contains_key(&id)
    }

    /// 关闭并清空所有客户端，返回关闭的数量
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.lock_clients().drain().collect();
        for (_, sink) in &drained {
            sink.close();
        }
        drained.len()
    }

    /// 把缓存中的新帧转发给所有客户端，直到 `shutdown` 触发
    ///
    /// 只有这一个任务调用 `broadcast`，同一时刻至多一次广播在进行。
    /// 订阅在返回 future 之前完成，之后发布的帧都不会漏掉。
    pub fn run(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> impl Future<Output = ()> + Send + 'static {
        let frames = self.cache.subscribe();
        self.pump(frames, shutdown)
    }

    async fn pump(
        self: Arc<Self>,
        mut frames: watch::Receiver<Option<EncodedFrame>>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let frame = frames.borrow_and_update().clone();
                    if let Some(frame) = frame {
                        self.broadcast(&frame);
                    }
                }
            }
        }
        log::debug!("广播任务退出");
    }

    fn drop_client(&self, id: ClientId) {
        let removed = self.lock_clients().remove(&id);
        if let Some(sink) = removed {
            sink.close();
        }
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<ClientId, Arc<dyn FrameSink>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
