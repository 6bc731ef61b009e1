//! 通过 `adb exec-out screencap -p` 从 Android 设备取帧
//!
//! 会话令牌即设备序列号（为空时使用 adb 默认设备）。
//! 输出分辨率在打开时按设备方向确定，之后固定不变。

use super::source::{CaptureBackend, CaptureToken, FrameSource, RawFrame};
use image::ImageFormat;
use image::imageops::FilterType;
use std::process::Command;

pub struct AdbBackend {
    program: String,
    width: u32,
    height: u32,
}

impl AdbBackend {
    /// `width` x `height` 为竖屏尺寸，横屏设备会自动对调
    pub fn new(program: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            program: program.into(),
            width,
            height,
        }
    }
}

impl CaptureBackend for AdbBackend {
    fn name(&self) -> &'static str {
        "adb"
    }

    fn open(&self, token: &CaptureToken) -> Result<Box<dyn FrameSource>, String> {
        let serial = Some(token.as_str()).filter(|s| !s.is_empty()).map(str::to_string);
        let mut source = AdbSource {
            program: self.program.clone(),
            serial,
            width: self.width,
            height: self.height,
        };

        // 先取一帧判断方向
        let (device_w, device_h) = source.screencap().map(|img| img.dimensions())?;
        let portrait_target = self.height >= self.width;
        if (device_w > device_h) == portrait_target {
            std::mem::swap(&mut source.width, &mut source.height);
        }
        log::info!(
            "adb 设备 {} 屏幕 {}x{}，输出 {}x{}",
            source.serial.as_deref().unwrap_or("<default>"),
            device_w,
            device_h,
            source.width,
            source.height
        );
        Ok(Box::new(source))
    }
}

pub struct AdbSource {
    program: String,
    serial: Option<String>,
    width: u32,
    height: u32,
}

impl AdbSource {
    fn screencap(&self) -> Result<image::RgbaImage, String> {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        let output = cmd
            .args(["exec-out", "screencap", "-p"])
            .output()
            .map_err(|e| format!("无法执行 {}: {}", self.program, e))?;

        if !output.status.success() {
            return Err(format!(
                "screencap 失败: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map(|img| img.to_rgba8())
            .map_err(|e| format!("解析 screencap 输出失败: {}", e))
    }
}

impl FrameSource for AdbSource {
    fn capture(&mut self) -> Result<Option<RawFrame>, String> {
        let img = self.screencap()?;
        let scaled = if img.dimensions() == (self.width, self.height) {
            img
        } else {
            image::imageops::resize(&img, self.width, self.height, FilterType::Triangle)
        };

        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            rgba: scaled.into_raw(),
        }))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_adb_binary_fails_open() {
        let backend = AdbBackend::new("/nonexistent/adb-binary", 72, 128);
        let err = backend.open(&CaptureToken::new("emulator-5554")).err().unwrap();
        assert!(err.contains("/nonexistent/adb-binary"), "{}", err);
    }
}
