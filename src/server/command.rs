use super::AppState;
use super::error::RouteError;
use crate::input;
use crate::protocol::command::{Command, CommandResult};
use axum::Json;
use axum::extract::{Form, FromRequest, Multipart, Query, Request, State};
use axum::http::header;
use std::collections::HashMap;

type Fields = HashMap<String, String>;

/// `POST /api/command`
///
/// 参数可以放在查询串、urlencoded 表单或 multipart 表单中，表单字段覆盖查询串。
pub async fn handle_command(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<CommandResult>, RouteError> {
    let fields = read_fields(req).await?;
    let command = Command::parse(
        fields.get("command").map(String::as_str),
        fields.get("value").map(String::as_str),
    )?;
    let name = command.name();

    // 执行器可能调用外部进程，放到阻塞线程池
    let executor = state.executor.clone();
    let success =
        match tokio::task::spawn_blocking(move || input::execute(executor.as_ref(), &command))
            .await
        {
            Ok(success) => success,
            Err(e) => {
                log::error!("执行指令 {} 的任务异常: {}", name, e);
                false
            }
        };

    log::debug!("指令 {} 执行结果: {}", name, success);
    Ok(Json(CommandResult { success }))
}

async fn read_fields(req: Request) -> Result<Fields, RouteError> {
    let mut fields = match Query::<Fields>::try_from_uri(req.uri()) {
        Ok(Query(query)) => query,
        Err(e) => return Err(RouteError::BadRequest(e.body_text())),
    };

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<Fields>::from_request(req, &())
            .await
            .map_err(|e| RouteError::BadRequest(e.body_text()))?;
        fields.extend(form);
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| RouteError::BadRequest(e.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| RouteError::BadRequest(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| RouteError::BadRequest(e.body_text()))?;
            fields.insert(name, value);
        }
    }

    Ok(fields)
}
