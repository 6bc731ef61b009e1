use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 帧率范围
pub const MIN_FRAME_RATE: u32 = 5;
pub const MAX_FRAME_RATE: u32 = 30;
pub const INITIAL_FRAME_RATE: u32 = 15;

/// JPEG 质量范围
pub const QUALITY_LOW: u8 = 60;
pub const QUALITY_HIGH: u8 = 100;

/// 降级 / 提升步长
const RATE_DEGRADE_STEP: u32 = 5;
const QUALITY_DEGRADE_STEP: u8 = 10;
const RATE_IMPROVE_STEP: u32 = 1;
const QUALITY_IMPROVE_STEP: u8 = 5;

/// 内存占用超过此比例视为资源紧张
pub const MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;

/// 丢帧统计窗口（最近 N 个 tick）
pub const DROP_WINDOW: usize = 30;

/// 控制器状态，只能由 [`RateController`] 修改
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRateState {
    pub frame_rate: u32,
    pub capture_interval_ms: u64,
    pub quality: u8,
    pub consecutive_captures: u32,
    pub last_capture: Option<Instant>,
}

/// 单个 tick 的决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// 距上次采集不足一个间隔，本 tick 跳过
    Skip,
    Capture { quality: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Degrade,
    Improve,
    Hold,
}

/// 帧率 / 质量闭环控制器
///
/// 每个 tick 回答"现在是否采集、用什么质量"。帧率与质量总是同步升降。
/// 丢帧计数是一个滑动窗口：跳过的 tick 与超时的采集都记为丢帧，
/// 窗口内丢帧达到一半时即使没有内存压力也会降级，从而自动回落到可维持的帧率。
///
/// 采集线程按 `上次 tick + interval()` 调度，正常运行时 `on_tick` 不会返回
/// `Skip`；实际的丢帧主要来自 `record_overrun`。跳过规则只在 tick 早于间隔
/// 到来时生效（例如调用方自行驱动 tick）。
pub struct RateController {
    state: FrameRateState,
    /// true = 丢帧
    window: VecDeque<bool>,
    last_adjustment: Adjustment,
}

impl RateController {
    pub fn new(initial_rate: u32, initial_quality: u8) -> Self {
        let frame_rate = initial_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        Self {
            state: FrameRateState {
                frame_rate,
                capture_interval_ms: interval_ms_for_rate(frame_rate),
                quality: initial_quality.clamp(QUALITY_LOW, QUALITY_HIGH),
                consecutive_captures: 0,
                last_capture: None,
            },
            window: VecDeque::with_capacity(DROP_WINDOW),
            last_adjustment: Adjustment::Hold,
        }
    }

    pub fn state(&self) -> &FrameRateState {
        &self.state
    }

    pub fn frame_rate(&self) -> u32 {
        self.state.frame_rate
    }

    pub fn quality(&self) -> u8 {
        self.state.quality
    }

    /// 当前采集间隔，调度循环每轮读取一次
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.state.capture_interval_ms)
    }

    pub fn dropped_frames(&self) -> usize {
        self.window.iter().filter(|dropped| **dropped).count()
    }

    pub fn last_adjustment(&self) -> Adjustment {
        self.last_adjustment
    }

    pub fn on_tick(&mut self, now: Instant, pressure: f64) -> TickDecision {
        if let Some(last) = self.state.last_capture {
            if now.saturating_duration_since(last) < self.interval() {
                self.record(true);
                self.state.consecutive_captures = 0;
                self.last_adjustment = Adjustment::Hold;
                return TickDecision::Skip;
            }
        }

        let adjustment = if pressure > MEMORY_PRESSURE_THRESHOLD {
            Adjustment::Degrade
        } else if self.dropped_frames() < DROP_WINDOW / 2 {
            Adjustment::Improve
        } else {
            Adjustment::Degrade
        };
        self.apply(adjustment);

        self.record(false);
        self.state.consecutive_captures = self.state.consecutive_captures.saturating_add(1);
        self.state.last_capture = Some(now);

        TickDecision::Capture {
            quality: self.state.quality,
        }
    }

    /// 本次采集耗时超过了当前间隔，把刚记录的 tick 改记为丢帧
    pub fn record_overrun(&mut self) {
        match self.window.back_mut() {
            Some(last) => *last = true,
            None => self.record(true),
        }
    }

    fn apply(&mut self, adjustment: Adjustment) {
        let state = &mut self.state;
        match adjustment {
            Adjustment::Degrade => {
                state.frame_rate = state
                    .frame_rate
                    .saturating_sub(RATE_DEGRADE_STEP)
                    .max(MIN_FRAME_RATE);
                state.quality = state
                    .quality
                    .saturating_sub(QUALITY_DEGRADE_STEP)
                    .max(QUALITY_LOW);
                self.window.clear();
            }
            Adjustment::Improve => {
                state.frame_rate = (state.frame_rate + RATE_IMPROVE_STEP).min(MAX_FRAME_RATE);
                state.quality = state
                    .quality
                    .saturating_add(QUALITY_IMPROVE_STEP)
                    .min(QUALITY_HIGH);
            }
            Adjustment::Hold => {}
        }

        let interval_ms = interval_ms_for_rate(state.frame_rate);
        if interval_ms != state.capture_interval_ms {
            log::debug!(
                "采集间隔调整: {}ms -> {}ms ({}fps, 质量 {})",
                state.capture_interval_ms,
                interval_ms,
                state.frame_rate,
                state.quality
            );
            state.capture_interval_ms = interval_ms;
        }
        self.last_adjustment = adjustment;
    }

    fn record(&mut self, dropped: bool) {
        if self.window.len() == DROP_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(dropped);
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(INITIAL_FRAME_RATE, QUALITY_HIGH)
    }
}

pub fn interval_ms_for_rate(frame_rate: u32) -> u64 {
    1000 / frame_rate.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 从 `start` 开始，每次前进一个当前间隔，保证不会被限速跳过
    fn run_ticks(controller: &mut RateController, start: Instant, n: usize, pressure: f64) -> Instant {
        let mut now = start;
        for _ in 0..n {
            now += controller.interval();
            assert_ne!(controller.on_tick(now, pressure), TickDecision::Skip);
        }
        now
    }

    fn assert_in_bounds(controller: &RateController) {
        let state = controller.state();
        assert!((MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&state.frame_rate));
        assert!((QUALITY_LOW..=QUALITY_HIGH).contains(&state.quality));
        assert_eq!(state.capture_interval_ms, interval_ms_for_rate(state.frame_rate));
    }

    #[test]
    fn initial_values_are_clamped() {
        let controller = RateController::new(500, 5);
        assert_eq!(controller.frame_rate(), MAX_FRAME_RATE);
        assert_eq!(controller.quality(), QUALITY_LOW);

        let controller = RateController::new(0, 255);
        assert_eq!(controller.frame_rate(), MIN_FRAME_RATE);
        assert_eq!(controller.quality(), QUALITY_HIGH);
    }

    #[test]
    fn skips_tick_inside_interval() {
        let mut controller = RateController::default();
        let start = Instant::now();
        assert!(matches!(controller.on_tick(start, 0.0), TickDecision::Capture { .. }));

        let too_soon = start + Duration::from_millis(1);
        assert_eq!(controller.on_tick(too_soon, 0.0), TickDecision::Skip);
        assert_eq!(controller.dropped_frames(), 1);
        assert_eq!(controller.state().consecutive_captures, 0);
    }

    #[test]
    fn pressure_degrades_in_lockstep() {
        let mut controller = RateController::new(20, 90);
        let decision = controller.on_tick(Instant::now(), 0.95);

        assert_eq!(decision, TickDecision::Capture { quality: 80 });
        assert_eq!(controller.frame_rate(), 15);
        assert_eq!(controller.state().capture_interval_ms, 66);
        assert_eq!(controller.last_adjustment(), Adjustment::Degrade);
    }

    #[test]
    fn sustained_pressure_reaches_floors() {
        let mut controller = RateController::new(MAX_FRAME_RATE, QUALITY_HIGH);
        let mut previous = controller.state().clone();
        let mut now = Instant::now();

        // 30 -> 5 需要 5 步，100 -> 60 需要 4 步
        for _ in 0..5 {
            now = run_ticks(&mut controller, now, 1, 1.0);
            let state = controller.state();
            assert!(state.frame_rate <= previous.frame_rate);
            assert!(state.quality <= previous.quality);
            previous = state.clone();
        }

        assert_eq!(controller.frame_rate(), MIN_FRAME_RATE);
        assert_eq!(controller.quality(), QUALITY_LOW);

        run_ticks(&mut controller, now, 10, 1.0);
        assert_eq!(controller.frame_rate(), MIN_FRAME_RATE);
        assert_eq!(controller.quality(), QUALITY_LOW);
    }

    #[test]
    fn healthy_delivery_reaches_ceilings() {
        let mut controller = RateController::new(MIN_FRAME_RATE, QUALITY_LOW);
        let mut previous = controller.state().clone();
        let mut now = Instant::now();

        // 5 -> 30 需要 25 步
        for _ in 0..25 {
            now = run_ticks(&mut controller, now, 1, 0.1);
            let state = controller.state();
            assert!(state.frame_rate >= previous.frame_rate);
            assert!(state.quality >= previous.quality);
            previous = state.clone();
        }

        assert_eq!(controller.frame_rate(), MAX_FRAME_RATE);
        assert_eq!(controller.quality(), QUALITY_HIGH);
        assert_eq!(controller.state().consecutive_captures, 25);
    }

    #[test]
    fn overrun_heavy_window_degrades_and_resets() {
        let mut controller = RateController::new(MAX_FRAME_RATE, QUALITY_HIGH);
        let mut now = Instant::now();

        for _ in 0..(DROP_WINDOW / 2) {
            now += controller.interval();
            controller.on_tick(now, 0.0);
            controller.record_overrun();
        }
        assert_eq!(controller.dropped_frames(), DROP_WINDOW / 2);

        now += controller.interval();
        controller.on_tick(now, 0.0);
        assert_eq!(controller.last_adjustment(), Adjustment::Degrade);
        assert_eq!(controller.frame_rate(), MAX_FRAME_RATE - 5);
        assert_eq!(controller.dropped_frames(), 0);
    }

    #[test]
    fn window_slides_instead_of_latching() {
        let mut controller = RateController::new(10, 80);
        let mut now = Instant::now();
        controller.on_tick(now, 0.0);

        // 14 次跳过，仍低于一半，之后的健康 tick 把它们挤出窗口
        for _ in 0..14 {
            assert_eq!(controller.on_tick(now, 0.0), TickDecision::Skip);
        }
        assert_eq!(controller.dropped_frames(), 14);
        for _ in 0..DROP_WINDOW {
            now += controller.interval();
            controller.on_tick(now, 0.0);
        }
        assert_eq!(controller.dropped_frames(), 0);
        assert_eq!(controller.last_adjustment(), Adjustment::Improve);
    }

    #[test]
    fn bounds_hold_for_arbitrary_pressure_sequences() {
        let mut controller = RateController::default();
        let mut now = Instant::now();
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;

        for _ in 0..5_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let pressure = (seed % 1000) as f64 / 1000.0;
            // 偶尔提前到来的 tick 会被限速跳过
            let step = if seed % 5 == 0 {
                Duration::from_millis(seed % 20)
            } else {
                controller.interval()
            };
            now += step;
            controller.on_tick(now, pressure);
            if seed % 7 == 0 {
                controller.record_overrun();
            }
            assert_in_bounds(&controller);
        }
    }
}
