use super::{CommandExecutor, SwipeDirection, VolumeDirection, report};
use std::process::Command;

/// 未知设备尺寸时的滑动坐标（像素）
const FALLBACK_SWIPE_NEAR: i32 = 300;
const FALLBACK_SWIPE_FAR: i32 = 800;
const FALLBACK_SWIPE_MID: i32 = 500;

/// 通过 `adb shell input` 注入触摸与按键
///
/// 客户端发来的点击坐标位于串流画面坐标系，这里按设备物理尺寸换算。
pub struct AdbExecutor {
    program: String,
    serial: Option<String>,
    /// 串流画面尺寸
    frame_size: (u32, u32),
    /// 设备物理尺寸，查询失败时为 None
    device_size: Option<(u32, u32)>,
}

impl AdbExecutor {
    pub fn new(program: impl Into<String>, serial: Option<String>, frame_size: (u32, u32)) -> Self {
        let mut executor = Self {
            program: program.into(),
            serial: serial.filter(|s| !s.is_empty()),
            frame_size,
            device_size: None,
        };

        match executor.query_device_size() {
            Ok(size) => {
                log::info!("adb 设备物理尺寸 {}x{}", size.0, size.1);
                executor.device_size = Some(size);
            }
            Err(e) => log::warn!("查询设备尺寸失败，点击坐标将不做换算: {}", e),
        }
        executor
    }

    fn shell(&self, args: &[&str]) -> Result<String, String> {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        log::debug!("adb shell {}", args.join(" "));

        let output = cmd
            .arg("shell")
            .args(args)
            .output()
            .map_err(|e| format!("无法执行 {}: {}", self.program, e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn input(&self, args: &[String]) -> Result<(), String> {
        let mut full: Vec<&str> = vec!["input"];
        full.extend(args.iter().map(String::as_str));
        self.shell(&full).map(|_| ())
    }

    fn keyevent(&self, keycode: &str) -> Result<(), String> {
        self.input(&["keyevent".to_string(), keycode.to_string()])
    }

    fn query_device_size(&self) -> Result<(u32, u32), String> {
        let output = self.shell(&["wm", "size"])?;
        parse_wm_size(&output).ok_or_else(|| format!("无法解析 wm size 输出: {:?}", output.trim()))
    }

    /// 画面坐标 -> 设备坐标
    fn to_device_point(&self, x: i32, y: i32) -> (i32, i32) {
        let Some((device_w, device_h)) = self.device_size else {
            return (x, y);
        };

        // 画面与设备方向不一致时对调画面尺寸
        let (mut frame_w, mut frame_h) = self.frame_size;
        if (frame_w > frame_h) != (device_w > device_h) {
            std::mem::swap(&mut frame_w, &mut frame_h);
        }

        let scale = |v: i32, from: u32, to: u32| -> i32 {
            let v = v.clamp(0, from.saturating_sub(1) as i32) as i64;
            (v * to as i64 / from.max(1) as i64) as i32
        };
        (scale(x, frame_w, device_w), scale(y, frame_h, device_h))
    }

    fn swipe_path(&self, direction: SwipeDirection) -> [i32; 4] {
        let (near, mid, far, near_v, mid_v, far_v) = match self.device_size {
            Some((w, h)) => {
                let (w, h) = (w as i32, h as i32);
                (w * 3 / 10, w / 2, w * 7 / 10, h * 3 / 10, h / 2, h * 7 / 10)
            }
            None => (
                FALLBACK_SWIPE_NEAR,
                FALLBACK_SWIPE_MID,
                FALLBACK_SWIPE_FAR,
                FALLBACK_SWIPE_NEAR,
                FALLBACK_SWIPE_MID,
                FALLBACK_SWIPE_FAR,
            ),
        };

        match direction {
            SwipeDirection::Up => [mid, far_v, mid, near_v],
            SwipeDirection::Down => [mid, near_v, mid, far_v],
            SwipeDirection::Left => [far, mid_v, near, mid_v],
            SwipeDirection::Right => [near, mid_v, far, mid_v],
        }
    }
}

impl CommandExecutor for AdbExecutor {
    fn swipe(&self, direction: &str) -> bool {
        let result = SwipeDirection::parse(direction)
            .ok_or_else(|| format!("无效的滑动方向: {:?}", direction))
            .and_then(|dir| {
                let mut args = vec!["swipe".to_string()];
                args.extend(self.swipe_path(dir).iter().map(i32::to_string));
                self.input(&args)
            });
        report("swipe", result)
    }

    fn tap(&self, x: i32, y: i32) -> bool {
        let (dx, dy) = self.to_device_point(x, y);
        report(
            "tap",
            self.input(&["tap".to_string(), dx.to_string(), dy.to_string()]),
        )
    }

    fn back(&self) -> bool {
        report("back", self.keyevent("KEYCODE_BACK"))
    }

    fn home(&self) -> bool {
        report("home", self.keyevent("KEYCODE_HOME"))
    }

    fn recents(&self) -> bool {
        report("recents", self.keyevent("KEYCODE_APP_SWITCH"))
    }

    fn volume(&self, direction: &str) -> bool {
        let result = match VolumeDirection::parse(direction) {
            Some(VolumeDirection::Up) => self.keyevent("KEYCODE_VOLUME_UP"),
            Some(VolumeDirection::Down) => self.keyevent("KEYCODE_VOLUME_DOWN"),
            None => Err(format!("无效的音量方向: {:?}", direction)),
        };
        report("volume", result)
    }
}

/// 解析 `wm size` 输出，优先使用 Override size
fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let parse_line = |prefix: &str| -> Option<(u32, u32)> {
        output.lines().find_map(|line| {
            let (w, h) = line.trim().strip_prefix(prefix)?.trim().split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
    };
    parse_line("Override size:").or_else(|| parse_line("Physical size:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline(device_size: Option<(u32, u32)>) -> AdbExecutor {
        AdbExecutor {
            program: "/nonexistent/adb-binary".to_string(),
            serial: None,
            frame_size: (720, 1280),
            device_size,
        }
    }

    #[test]
    fn parses_wm_size_output() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1600\n"),
            Some((720, 1600))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn scales_frame_points_to_device() {
        let executor = offline(Some((1080, 1920)));
        assert_eq!(executor.to_device_point(360, 640), (540, 960));
        assert_eq!(executor.to_device_point(-5, 99_999), (0, 1918));

        let landscape = offline(Some((1920, 1080)));
        assert_eq!(landscape.to_device_point(640, 360), (960, 540));
    }

    #[test]
    fn swipe_up_moves_towards_top() {
        let executor = offline(None);
        assert_eq!(executor.swipe_path(SwipeDirection::Up), [500, 800, 500, 300]);
        let [_, y1, _, y2] = offline(Some((1000, 2000))).swipe_path(SwipeDirection::Up);
        assert!(y1 > y2);
    }

    #[test]
    fn failures_become_false() {
        let executor = offline(None);
        assert!(!executor.back());
        assert!(!executor.swipe("up"));
        assert!(!executor.swipe("nowhere"));
        assert!(!executor.volume("sideways"));
    }
}
