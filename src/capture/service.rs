use super::controller::{RateController, TickDecision};
use super::pressure::PressureGauge;
use super::source::{CaptureBackend, CaptureToken, FrameSource};
use crate::encode::jpeg::encode_jpeg;
use crate::protocol::frame::EncodedFrame;
use crate::transport::cache::FrameCache;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// 统计日志输出间隔
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub initial_fps: u32,
    pub initial_quality: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("打开帧源失败 ({backend}): {reason}")]
    Open {
        backend: &'static str,
        reason: String,
    },
    #[error("启动采集线程失败: {0}")]
    Spawn(#[from] std::io::Error),
}

struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<Box<dyn FrameSource>>,
}

/// 采集服务：响应外部的启动 / 停止信号，驱动唯一的采集循环
///
/// 采集在独立线程中进行（平台采集 API 可能短暂阻塞），
/// 每轮从控制器读取当前间隔，因此改变帧率不需要"取消旧定时器再建新定时器"，
/// 任何时刻至多一个调度在运行。
pub struct CaptureService {
    backend: Arc<dyn CaptureBackend>,
    pressure: Arc<dyn PressureGauge>,
    cache: Arc<FrameCache>,
    settings: CaptureSettings,
    worker: Mutex<Option<CaptureWorker>>,
}

impl CaptureService {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        pressure: Arc<dyn PressureGauge>,
        cache: Arc<FrameCache>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            backend,
            pressure,
            cache,
            settings,
            worker: Mutex::new(None),
        }
    }

    /// 启动信号；已在运行时直接返回
    pub fn start(&self, token: &CaptureToken) -> Result<(), CaptureError> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            log::debug!("采集已在运行，忽略重复的启动信号");
            return Ok(());
        }

        let source = self.backend.open(token).map_err(|reason| CaptureError::Open {
            backend: self.backend.name(),
            reason,
        })?;
        log::info!(
            "开始采集: 后端 {}, {}x{} @{}fps, 质量 {}",
            self.backend.name(),
            source.width(),
            source.height(),
            self.settings.initial_fps,
            self.settings.initial_quality
        );

        // 每次启动都重新初始化帧率与质量
        let controller =
            RateController::new(self.settings.initial_fps, self.settings.initial_quality);
        let (stop_tx, stop_rx) = mpsc::channel();
        let cache = self.cache.clone();
        let pressure = self.pressure.clone();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(source, controller, pressure, cache, stop_rx))?;

        *worker = Some(CaptureWorker { stop_tx, thread });
        Ok(())
    }

    /// 停止信号：取消调度并等待采集线程退出，把帧源交还调用方释放
    ///
    /// 未在运行时返回 `None`。
    pub fn halt(&self) -> Option<Box<dyn FrameSource>> {
        let worker = self.lock_worker().take()?;
        let _ = worker.stop_tx.send(());

        match worker.thread.join() {
            Ok(source) => {
                log::info!("采集已停止");
                Some(source)
            }
            Err(_) => {
                log::error!("采集线程异常退出");
                None
            }
        }
    }

    /// 停止采集并立即释放帧源
    pub fn stop(&self) {
        drop(self.halt());
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<CaptureWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    mut controller: RateController,
    pressure: Arc<dyn PressureGauge>,
    cache: Arc<FrameCache>,
    stop_rx: mpsc::Receiver<()>,
) -> Box<dyn FrameSource> {
    let mut next_tick = Instant::now();

    let mut stats_interval = Instant::now();
    let mut frames_published: u64 = 0;
    let mut total_encode_time_us: u64 = 0;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let tick_start = Instant::now();
        let decision = controller.on_tick(tick_start, pressure.sample());
        let interval = controller.interval();
        next_tick = tick_start + interval;

        let TickDecision::Capture { quality } = decision else {
            continue;
        };

        match capture_and_encode(source.as_mut(), quality) {
            Ok(Some((jpeg, encode_time_us))) => {
                cache.publish(EncodedFrame::new(cache.next_sequence(), jpeg));
                frames_published += 1;
                total_encode_time_us += encode_time_us;
            }
            Ok(None) => log::debug!("本 tick 没有新画面"),
            // 采集或编码失败不反馈给控制器，只跳过本帧
            Err(e) => log::warn!("采集失败: {}", e),
        }

        if tick_start.elapsed() > interval {
            controller.record_overrun();
        }

        if stats_interval.elapsed() >= STATS_INTERVAL {
            let elapsed_secs = stats_interval.elapsed().as_secs_f64();
            let avg_encode_ms = if frames_published > 0 {
                (total_encode_time_us as f64 / frames_published as f64) / 1000.0
            } else {
                0.0
            };
            log::info!(
                "采集统计: 已发布 {} 帧, 实际帧率 {:.1}fps, 目标 {}fps, 质量 {}, 平均编码耗时 {:.2}ms, 窗口丢帧 {}",
                frames_published,
                frames_published as f64 / elapsed_secs,
                controller.frame_rate(),
                controller.quality(),
                avg_encode_ms,
                controller.dropped_frames(),
            );
            stats_interval = Instant::now();
            frames_published = 0;
            total_encode_time_us = 0;
        }
    }

    source
}

fn capture_and_encode(
    source: &mut dyn FrameSource,
    quality: u8,
) -> Result<Option<(Vec<u8>, u64)>, String> {
    let Some(raw) = source.capture()? else {
        return Ok(None);
    };

    let encode_start = Instant::now();
    let jpeg = encode_jpeg(&raw, quality)?;
    Ok(Some((jpeg, encode_start.elapsed().as_micros() as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pattern::PatternBackend;
    use crate::capture::pressure::FixedPressure;
    use crate::capture::source::RawFrame;

    fn service(backend: Arc<dyn CaptureBackend>, cache: Arc<FrameCache>) -> CaptureService {
        CaptureService::new(
            backend,
            Arc::new(FixedPressure(0.1)),
            cache,
            CaptureSettings {
                initial_fps: 30,
                initial_quality: 70,
            },
        )
    }

    fn wait_for_frame(cache: &FrameCache) -> Option<EncodedFrame> {
        for _ in 0..200 {
            if let Some(frame) = cache.current() {
                return Some(frame);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn publishes_frames_until_stopped() {
        let cache = Arc::new(FrameCache::new());
        let capture = service(Arc::new(PatternBackend::new(32, 32)), cache.clone());

        capture.start(&CaptureToken::default()).unwrap();
        assert!(capture.is_running());

        let frame = wait_for_frame(&cache).expect("no frame published");
        assert_eq!(&frame.bytes[..2], &[0xFF, 0xD8]);

        let source = capture.halt().expect("source handed back");
        assert_eq!(source.width(), 32);
        assert!(!capture.is_running());

        let last = cache.current().map(|f| f.sequence);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.current().map(|f| f.sequence), last, "no frames after stop");
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let cache = Arc::new(FrameCache::new());
        let capture = service(Arc::new(PatternBackend::new(16, 16)), cache);

        capture.start(&CaptureToken::default()).unwrap();
        capture.start(&CaptureToken::default()).unwrap();
        assert!(capture.is_running());

        capture.stop();
        capture.stop();
        assert!(capture.halt().is_none());
    }

    #[test]
    fn restart_keeps_sequence_increasing() {
        let cache = Arc::new(FrameCache::new());
        let capture = service(Arc::new(PatternBackend::new(16, 16)), cache.clone());

        capture.start(&CaptureToken::default()).unwrap();
        wait_for_frame(&cache).expect("no frame before restart");
        std::thread::sleep(Duration::from_millis(150));
        capture.stop();
        let before = cache.current().map(|f| f.sequence).unwrap();

        capture.start(&CaptureToken::default()).unwrap();
        let mut after = before;
        for _ in 0..200 {
            after = cache.current().map(|f| f.sequence).unwrap();
            if after > before {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        capture.stop();
        assert!(after > before, "sequence went from {} to {}", before, after);
    }

    struct FailingBackend;

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn capture(&mut self) -> Result<Option<RawFrame>, String> {
            Err("display lost".to_string())
        }

        fn width(&self) -> u32 {
            1
        }

        fn height(&self) -> u32 {
            1
        }
    }

    impl CaptureBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn open(&self, token: &CaptureToken) -> Result<Box<dyn FrameSource>, String> {
            if token.as_str() == "denied" {
                return Err("permission denied".to_string());
            }
            Ok(Box::new(FailingSource))
        }
    }

    #[test]
    fn capture_failures_are_swallowed() {
        let cache = Arc::new(FrameCache::new());
        let capture = service(Arc::new(FailingBackend), cache.clone());

        capture.start(&CaptureToken::default()).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert!(capture.is_running());
        assert!(cache.current().is_none());
        capture.stop();
    }

    #[test]
    fn open_failure_is_reported() {
        let capture = service(Arc::new(FailingBackend), Arc::new(FrameCache::new()));
        let err = capture.start(&CaptureToken::new("denied")).unwrap_err();
        assert!(matches!(err, CaptureError::Open { backend: "failing", .. }));
        assert!(!capture.is_running());
    }
}
