pub mod adb;
pub mod logging;

use crate::protocol::command::Command;

/// 滑动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

impl VolumeDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// 设备控制能力
///
/// 每个操作只报告成功 / 失败，绝不向路由层抛出错误。
pub trait CommandExecutor: Send + Sync {
    fn swipe(&self, direction: &str) -> bool;

    fn tap(&self, x: i32, y: i32) -> bool;

    fn back(&self) -> bool;

    fn home(&self) -> bool;

    fn recents(&self) -> bool;

    fn volume(&self, direction: &str) -> bool;
}

/// 把解析好的指令分派给执行器
pub fn execute(executor: &dyn CommandExecutor, command: &Command) -> bool {
    match command {
        Command::Swipe(direction) => executor.swipe(direction),
        Command::Tap { x, y } => executor.tap(*x, *y),
        Command::Back => executor.back(),
        Command::Home => executor.home(),
        Command::Recents => executor.recents(),
        Command::Volume(direction) => executor.volume(direction),
    }
}

/// 把内部 `Result` 收敛为布尔结果，失败时记录原因
pub(crate) fn report(action: &str, result: Result<(), String>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("执行 {} 失败: {}", action, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_case_sensitive() {
        assert_eq!(SwipeDirection::parse("left"), Some(SwipeDirection::Left));
        assert_eq!(SwipeDirection::parse("Left"), None);
        assert_eq!(VolumeDirection::parse("down"), Some(VolumeDirection::Down));
        assert_eq!(VolumeDirection::parse("left"), None);
    }
}
