//! Basic 认证中间件
//!
//! 比较的是用户名、密码各自的 SHA-256 摘要，并按固定长度逐字节异或累积，
//! 耗时与两串在哪一位开始不同无关。

use super::error::RouteError;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// 服务器配置的唯一一组凭据
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// 凭据摘要，启动时计算一次
pub struct CredentialVerifier {
    username: [u8; 32],
    password: [u8; 32],
}

impl CredentialVerifier {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            username: sha256(credentials.username.as_bytes()),
            password: sha256(credentials.password.as_bytes()),
        }
    }

    /// 校验 `Authorization` 头的值
    pub fn verify_header(&self, value: &str) -> bool {
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return false;
        };

        // 两项都比较完再合并结果
        let user_ok = digests_equal(&self.username, &sha256(username.as_bytes()));
        let pass_ok = digests_equal(&self.password, &sha256(password.as_bytes()));
        user_ok & pass_ok
    }
}

pub async fn require_basic_auth(
    State(verifier): State<Arc<CredentialVerifier>>,
    req: Request,
    next: Next,
) -> Result<Response, RouteError> {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| verifier.verify_header(h));

    if !authorized {
        log::debug!("认证失败: {} {}", req.method(), req.uri().path());
        return Err(RouteError::Unauthorized);
    }
    Ok(next.run(req).await)
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(&Credentials {
            username: "admin".to_string(),
            password: "s3cr:et".to_string(),
        })
    }

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn accepts_exact_pair() {
        assert!(verifier().verify_header(&basic("admin:s3cr:et")));
    }

    #[test]
    fn rejects_mismatches_and_garbage() {
        let v = verifier();
        assert!(!v.verify_header(&basic("Admin:s3cr:et")), "case sensitive");
        assert!(!v.verify_header(&basic("admin:s3cr")));
        assert!(!v.verify_header(&basic("admin")));
        assert!(!v.verify_header("Bearer abc"));
        assert!(!v.verify_header("Basic !!!not-base64!!!"));
        assert!(!v.verify_header(""));
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials {
            username: "u".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
