use crate::protocol::command::CommandParseError;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// 认证质询头
pub const AUTH_CHALLENGE: &str = "Basic realm=\"Remote Control\"";

/// 请求处理错误，全部以纯文本响应返回，不会越过路由层
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Upload too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Internal(String),
}

impl RouteError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RouteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RouteError::Unauthorized => StatusCode::UNAUTHORIZED,
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RouteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CommandParseError> for RouteError {
    fn from(err: CommandParseError) -> Self {
        RouteError::BadRequest(err.to_string())
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(AUTH_CHALLENGE),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_carries_challenge() {
        let response = RouteError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            AUTH_CHALLENGE
        );
    }

    #[test]
    fn parse_errors_are_bad_requests() {
        let err: RouteError = CommandParseError::InvalidCoordinates.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid coordinates");
    }
}
