use std::fmt;

/// 捕获到的原始帧（RGBA8，行紧密排列）
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RawFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

/// 捕获会话令牌，由外部启动信号携带，对本模块不透明
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CaptureToken(String);

impl CaptureToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CaptureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaptureToken([REDACTED])")
    }
}

/// 帧源：分辨率与格式在会话开始时确定
///
/// `Ok(None)` 表示此刻没有新画面可取。
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Option<RawFrame>, String>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;
}

/// 根据启动令牌打开帧源的平台后端
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, token: &CaptureToken) -> Result<Box<dyn FrameSource>, String>;
}
