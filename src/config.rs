//! 命令行 / 环境变量配置

use crate::capture::service::CaptureSettings;
use crate::server::ServerSettings;
use crate::server::auth::Credentials;
use crate::server::files::FileTransferSettings;
use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaptureKind {
    /// 合成测试图案
    Pattern,
    /// 通过 adb screencap 采集 Android 设备
    Adb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutorKind {
    /// 只记录日志
    Log,
    /// 通过 adb shell input 注入
    Adb,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("启用认证时必须同时提供非空的 --username 与 --password")]
    MissingCredentials,
}

#[derive(Parser, Clone)]
#[command(name = "webremote", version, about = "通过浏览器查看并控制设备屏幕")]
pub struct Config {
    /// 监听地址
    #[arg(long, env = "WEBREMOTE_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// 监听端口
    #[arg(short, long, env = "WEBREMOTE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// 启用 HTTP Basic 认证
    #[arg(long, env = "WEBREMOTE_AUTH")]
    pub auth: bool,

    #[arg(long, env = "WEBREMOTE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "WEBREMOTE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// 启用文件传输
    #[arg(long, env = "WEBREMOTE_FILE_TRANSFER")]
    pub file_transfer: bool,

    /// 文件存储目录，默认为系统下载目录
    #[arg(long, env = "WEBREMOTE_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// 单次上传上限（MB）
    #[arg(long, env = "WEBREMOTE_MAX_UPLOAD_MB", default_value_t = 512)]
    pub max_upload_mb: usize,

    #[arg(long, env = "WEBREMOTE_CAPTURE", value_enum, default_value_t = CaptureKind::Pattern)]
    pub capture: CaptureKind,

    /// 采集授权凭据；adb 后端下为设备序列号
    #[arg(long, env = "WEBREMOTE_CAPTURE_TOKEN", default_value = "", hide_env_values = true)]
    pub capture_token: String,

    /// 串流画面宽度
    #[arg(long, env = "WEBREMOTE_WIDTH", default_value_t = 720)]
    pub width: u32,

    /// 串流画面高度
    #[arg(long, env = "WEBREMOTE_HEIGHT", default_value_t = 1280)]
    pub height: u32,

    #[arg(long, env = "WEBREMOTE_INITIAL_FPS", default_value_t = 15)]
    pub initial_fps: u32,

    #[arg(long, env = "WEBREMOTE_INITIAL_QUALITY", default_value_t = 100)]
    pub initial_quality: u8,

    #[arg(long, env = "WEBREMOTE_EXECUTOR", value_enum, default_value_t = ExecutorKind::Log)]
    pub executor: ExecutorKind,

    /// adb 可执行文件
    #[arg(long, env = "WEBREMOTE_ADB", default_value = "adb")]
    pub adb_path: String,

    #[arg(long, env = "WEBREMOTE_ADB_SERIAL")]
    pub adb_serial: Option<String>,

    /// 串流单次写超时（毫秒）
    #[arg(long, env = "WEBREMOTE_SEND_TIMEOUT_MS", default_value_t = 5000)]
    pub send_timeout_ms: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("auth", &self.auth)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("file_transfer", &self.file_transfer)
            .field("storage_dir", &self.storage_dir)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("capture", &self.capture)
            .field("capture_token", &"[REDACTED]")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("initial_fps", &self.initial_fps)
            .field("initial_quality", &self.initial_quality)
            .field("executor", &self.executor)
            .field("adb_path", &self.adb_path)
            .field("adb_serial", &self.adb_serial)
            .field("send_timeout_ms", &self.send_timeout_ms)
            .finish()
    }
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn server_settings(&self) -> Result<ServerSettings, ConfigError> {
        let credentials = if self.auth {
            match (self.username.as_deref(), self.password.as_deref()) {
                (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Credentials {
                    username: u.to_string(),
                    password: p.to_string(),
                }),
                _ => return Err(ConfigError::MissingCredentials),
            }
        } else {
            None
        };

        let file_transfer = self.file_transfer.then(|| FileTransferSettings {
            storage_dir: self.resolve_storage_dir(),
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
        });

        Ok(ServerSettings {
            bind: self.bind_addr(),
            credentials,
            file_transfer,
            send_timeout: Duration::from_millis(self.send_timeout_ms.max(1)),
        })
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            initial_fps: self.initial_fps,
            initial_quality: self.initial_quality,
        }
    }

    fn resolve_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("./shared"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("webremote").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        let settings = config.server_settings().unwrap();
        assert_eq!(settings.bind, "0.0.0.0:8080".parse().unwrap());
        assert!(settings.credentials.is_none());
        assert!(settings.file_transfer.is_none());
        assert_eq!(settings.send_timeout, Duration::from_secs(5));
        assert_eq!(config.capture, CaptureKind::Pattern);
        assert_eq!(config.executor, ExecutorKind::Log);

        let capture = config.capture_settings();
        assert_eq!(capture.initial_fps, 15);
        assert_eq!(capture.initial_quality, 100);
    }

    #[test]
    fn auth_requires_both_credentials() {
        let config = parse(&["--auth", "--username", "admin"]);
        assert!(matches!(
            config.server_settings(),
            Err(ConfigError::MissingCredentials)
        ));

        let config = parse(&["--auth", "--username", "admin", "--password", "pw"]);
        let creds = config.server_settings().unwrap().credentials.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "pw");
    }

    #[test]
    fn file_transfer_settings() {
        let config = parse(&[
            "--file-transfer",
            "--storage-dir",
            "/tmp/shared",
            "--max-upload-mb",
            "2",
        ]);
        let files = config.server_settings().unwrap().file_transfer.unwrap();
        assert_eq!(files.storage_dir, PathBuf::from("/tmp/shared"));
        assert_eq!(files.max_upload_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = parse(&[
            "--auth",
            "--username",
            "admin",
            "--password",
            "hunter2",
            "--capture-token",
            "tok-123",
        ]);
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("tok-123"));
        assert!(debug.contains("admin"));
    }
}
