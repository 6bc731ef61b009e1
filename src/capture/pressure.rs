use std::sync::{Mutex, PoisonError};
use sysinfo::System;

/// 资源压力信号，取值 [0.0, 1.0]
pub trait PressureGauge: Send + Sync {
    fn sample(&self) -> f64;
}

/// 以系统内存占用率作为压力信号
pub struct SystemMemoryGauge {
    system: Mutex<System>,
}

impl SystemMemoryGauge {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureGauge for SystemMemoryGauge {
    fn sample(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// 固定压力值，供测试与禁用自适应时使用
pub struct FixedPressure(pub f64);

impl PressureGauge for FixedPressure {
    fn sample(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ratio_is_bounded() {
        let pressure = SystemMemoryGauge::new();
        let ratio = pressure.sample();
        assert!((0.0..=1.0).contains(&ratio));
    }
}
