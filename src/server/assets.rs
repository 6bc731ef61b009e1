use super::AppState;
use super::error::RouteError;
use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use serde::Serialize;

const INDEX_HTML: &str = include_str!("../../web/index.html");
const CONTROL_JS: &str = include_str!("../../web/control.js");
const STYLE_CSS: &str = include_str!("../../web/style.css");

/// 前端启动时读取的功能开关
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub file_transfer: bool,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn control_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CONTROL_JS,
    )
}

pub async fn style_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE_CSS)
}

/// `GET /screen.jpg`：Frame Cache 中的最新帧，供轮询回退使用
pub async fn latest_frame(State(state): State<AppState>) -> Result<impl IntoResponse, RouteError> {
    let frame = state
        .stream
        .hub
        .cache()
        .current()
        .ok_or_else(|| RouteError::NotFound("No frame captured yet".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        frame.bytes,
    ))
}

pub async fn client_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        file_transfer: state.file_transfer,
    })
}
