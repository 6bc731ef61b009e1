use super::{CommandExecutor, SwipeDirection, VolumeDirection, report};

/// 只校验参数并记录日志的执行器
///
/// 没有平台注入能力时使用，便于联调前端与协议。
#[derive(Debug, Default)]
pub struct LoggingExecutor;

impl CommandExecutor for LoggingExecutor {
    fn swipe(&self, direction: &str) -> bool {
        let result = SwipeDirection::parse(direction)
            .map(|dir| log::info!("执行滑动: {:?}", dir))
            .ok_or_else(|| format!("无效的滑动方向: {:?}", direction));
        report("swipe", result)
    }

    fn tap(&self, x: i32, y: i32) -> bool {
        log::info!("执行点击: ({}, {})", x, y);
        true
    }

    fn back(&self) -> bool {
        log::info!("执行返回键");
        true
    }

    fn home(&self) -> bool {
        log::info!("执行主页键");
        true
    }

    fn recents(&self) -> bool {
        log::info!("执行最近任务键");
        true
    }

    fn volume(&self, direction: &str) -> bool {
        let result = VolumeDirection::parse(direction)
            .map(|dir| log::info!("调节音量: {:?}", dir))
            .ok_or_else(|| format!("无效的音量方向: {:?}", direction));
        report("volume", result)
    }
}
