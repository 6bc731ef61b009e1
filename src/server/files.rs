//! 文件传输：列表、下载与上传
//!
//! 只在启用文件传输时注册。所有文件都位于同一个存储目录的顶层，
//! 含路径分隔符或 `..` 的文件名一律拒绝。

use super::error::RouteError;
use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// 上传过程中的临时文件前缀，列表中不可见
const TEMP_PREFIX: &str = ".upload-";

#[derive(Debug, Clone)]
pub struct FileTransferSettings {
    pub storage_dir: PathBuf,
    pub max_upload_bytes: usize,
}

pub struct FileStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    /// 修改时间，Unix 毫秒
    pub date: i64,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<FileEntry>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, RouteError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn temp_path(&self) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("{}{}-{}.part", TEMP_PREFIX, std::process::id(), n))
    }
}

pub fn router(store: Arc<FileStore>, settings: &FileTransferSettings) -> Router {
    Router::new()
        .route("/files/list", get(list_files))
        .route("/files/download/{name}", get(download_file))
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::max(settings.max_upload_bytes)),
        )
        .with_state(store)
}

/// 文件名只能是存储目录顶层的普通名字
fn validate_name(name: &str) -> Result<(), RouteError> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(TEMP_PREFIX);
    if invalid {
        log::warn!("拒绝非法文件名: {:?}", name);
        return Err(RouteError::BadRequest("Invalid file operation".to_string()));
    }
    Ok(())
}

fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    (OffsetDateTime::from(time).unix_timestamp_nanos() / 1_000_000) as i64
}

/// `GET /files/list`
pub async fn list_files(State(store): State<Arc<FileStore>>) -> Result<Json<FileList>, RouteError> {
    let mut files = Vec::new();
    let mut dir = match tokio::fs::read_dir(store.root()).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(FileList { files }));
        }
        Err(e) => {
            log::error!("读取存储目录失败: {}", e);
            return Err(RouteError::Internal("Error listing files".to_string()));
        }
    };

    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                log::warn!("遍历存储目录出错: {}", e);
                break;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let date = meta.modified().map(epoch_millis).unwrap_or(0);
        files.push(FileEntry {
            name,
            size: meta.len(),
            date,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(FileList { files }))
}

/// `GET /files/download/{name}`
pub async fn download_file(
    State(store): State<Arc<FileStore>>,
    Path(name): Path<String>,
) -> Result<Response, RouteError> {
    let path = store.resolve(&name)?;
    let not_found = || RouteError::NotFound("File not found".to_string());

    let meta = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
    if !meta.is_file() {
        return Err(not_found());
    }
    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;

    log::info!("下载文件: {} ({} 字节)", name, meta.len());
    let disposition = format!("attachment; filename=\"{}\"", name.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, mime_for(&name).to_string()),
            (header::CONTENT_LENGTH, meta.len().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `POST /api/upload`，multipart 字段 `file`，可选字段 / 查询参数 `fileName`
pub async fn upload_file(
    State(store): State<Arc<FileStore>>,
    Query(params): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> Result<&'static str, RouteError> {
    let temp = store.temp_path();
    match receive_upload(&store, &temp, params.get("fileName").cloned(), multipart).await {
        Ok(name) => {
            log::info!("文件已上传: {}", name);
            Ok("File uploaded successfully")
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            Err(e)
        }
    }
}

async fn receive_upload(
    store: &FileStore,
    temp: &FsPath,
    query_name: Option<String>,
    mut multipart: Multipart,
) -> Result<String, RouteError> {
    let mut field_name: Option<String> = None;
    let mut part_name: Option<String> = None;
    let mut received = false;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                part_name = field.file_name().map(str::to_string);
                let mut out = tokio::fs::File::create(temp).await.map_err(io_error)?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    out.write_all(&chunk).await.map_err(io_error)?;
                }
                out.flush().await.map_err(io_error)?;
                received = true;
            }
            Some("fileName") => {
                field_name = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    if !received {
        return Err(RouteError::BadRequest("Missing file field".to_string()));
    }

    let name = [query_name, field_name, part_name]
        .into_iter()
        .flatten()
        .find(|n| !n.is_empty())
        .unwrap_or_else(|| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            format!("uploaded_file_{}", millis)
        });

    let dest = store.resolve(&name)?;
    tokio::fs::rename(temp, &dest).await.map_err(io_error)?;
    Ok(name)
}

fn multipart_error(err: MultipartError) -> RouteError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return RouteError::PayloadTooLarge;
    }
    log::warn!("解析上传内容失败: {}", err);
    RouteError::BadRequest(err.body_text())
}

fn io_error(err: std::io::Error) -> RouteError {
    log::error!("写入上传文件失败: {}", err);
    RouteError::Internal("Error uploading file".to_string())
}
