use crate::protocol::frame::EncodedFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// 单槽最新帧缓存
///
/// 发布即整体替换，旧帧直接丢弃；没有队列，也没有背压。
/// 读者拿到的是完整帧的克隆（引用计数），不会看到写了一半的数据。
/// 帧序号也由缓存分配，在整个服务器生命周期内单调递增，
/// 采集重启后不会回到 1。
pub struct FrameCache {
    tx: watch::Sender<Option<EncodedFrame>>,
    sequence: AtomicU64,
}

impl FrameCache {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// 分配下一个帧序号，从 1 开始
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn publish(&self, frame: EncodedFrame) {
        self.tx.send_replace(Some(frame));
    }

    pub fn current(&self) -> Option<EncodedFrame> {
        self.tx.borrow().clone()
    }

    /// 订阅"有新帧"通知；接收端只会看到最新值
    pub fn subscribe(&self) -> watch::Receiver<Option<EncodedFrame>> {
        self.tx.subscribe()
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}
