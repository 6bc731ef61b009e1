use super::source::{CaptureBackend, CaptureToken, FrameSource, RawFrame};

/// 合成测试图案后端：没有真实显示器时也能跑通整条流水线
pub struct PatternBackend {
    width: u32,
    height: u32,
}

impl PatternBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(16),
            height: height.max(16),
        }
    }
}

impl CaptureBackend for PatternBackend {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn open(&self, _token: &CaptureToken) -> Result<Box<dyn FrameSource>, String> {
        Ok(Box::new(PatternSource {
            width: self.width,
            height: self.height,
            tick: 0,
        }))
    }
}

/// 渐变背景 + 一条随帧移动的横条
pub struct PatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl FrameSource for PatternSource {
    fn capture(&mut self) -> Result<Option<RawFrame>, String> {
        let (w, h) = (self.width, self.height);
        let mut rgba = Vec::with_capacity(RawFrame::expected_len(w, h));

        let bar_height = (h / 16).max(1);
        let bar_top = (self.tick * 4) % h;

        for y in 0..h {
            let in_bar = y >= bar_top && y < bar_top + bar_height;
            for x in 0..w {
                if in_bar {
                    rgba.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
                } else {
                    let r = (x * 255 / w) as u8;
                    let g = (y * 255 / h) as u8;
                    let b = (self.tick % 256) as u8;
                    rgba.extend_from_slice(&[r, g, b, 0xFF]);
                }
            }
        }

        self.tick = self.tick.wrapping_add(1);
        Ok(Some(RawFrame {
            width: w,
            height: h,
            rgba,
        }))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}
