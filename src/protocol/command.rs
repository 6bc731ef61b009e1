use serde::Serialize;

/// 远程控制指令
///
/// 方向参数保持原样交给执行器判断：非法方向由执行器返回失败，
/// 而不是在路由层拒绝。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Swipe(String),
    Tap { x: i32, y: i32 },
    Back,
    Home,
    Recents,
    Volume(String),
}

/// 指令解析错误，对应客户端协议错误（4xx）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Missing command parameter")]
    MissingCommand,
    #[error("Invalid coordinates")]
    InvalidCoordinates,
    #[error("Unknown command")]
    Unknown,
}

impl Command {
    pub fn parse(command: Option<&str>, value: Option<&str>) -> Result<Self, CommandParseError> {
        let command = command.ok_or(CommandParseError::MissingCommand)?;
        let value = value.unwrap_or_default();

        match command {
            "swipe" => Ok(Self::Swipe(value.to_string())),
            "tap" => parse_coordinates(value).map(|(x, y)| Self::Tap { x, y }),
            "back" => Ok(Self::Back),
            "home" => Ok(Self::Home),
            "recents" => Ok(Self::Recents),
            "volume" => Ok(Self::Volume(value.to_string())),
            _ => Err(CommandParseError::Unknown),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Swipe(_) => "swipe",
            Self::Tap { .. } => "tap",
            Self::Back => "back",
            Self::Home => "home",
            Self::Recents => "recents",
            Self::Volume(_) => "volume",
        }
    }
}

/// "x,y" 必须恰好是两个以逗号分隔的整数
fn parse_coordinates(value: &str) -> Result<(i32, i32), CommandParseError> {
    let mut parts = value.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CommandParseError::InvalidCoordinates);
    };

    let x = x.trim().parse::<i32>().map_err(|_| CommandParseError::InvalidCoordinates)?;
    let y = y.trim().parse::<i32>().map_err(|_| CommandParseError::InvalidCoordinates)?;
    Ok((x, y))
}

/// `POST /api/command` 的响应体
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CommandResult {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tap_coordinates() {
        assert_eq!(
            Command::parse(Some("tap"), Some("10,20")),
            Ok(Command::Tap { x: 10, y: 20 })
        );
        assert_eq!(
            Command::parse(Some("tap"), Some("-3, 4")),
            Ok(Command::Tap { x: -3, y: 4 })
        );
    }

    #[test]
    fn malformed_tap_is_a_protocol_error() {
        for value in [Some("abc"), Some("1"), Some("1,2,3"), Some("1,x"), Some(""), None] {
            assert_eq!(
                Command::parse(Some("tap"), value),
                Err(CommandParseError::InvalidCoordinates),
                "value {:?}",
                value
            );
        }
    }

    #[test]
    fn missing_and_unknown_commands() {
        assert_eq!(
            Command::parse(None, Some("up")),
            Err(CommandParseError::MissingCommand)
        );
        assert_eq!(
            Command::parse(Some("reboot"), None),
            Err(CommandParseError::Unknown)
        );
    }

    #[test]
    fn invalid_direction_is_passed_through() {
        assert_eq!(
            Command::parse(Some("swipe"), Some("sideways")),
            Ok(Command::Swipe("sideways".to_string()))
        );
        assert_eq!(
            Command::parse(Some("volume"), None),
            Ok(Command::Volume(String::new()))
        );
    }

    #[test]
    fn result_serializes_as_success_flag() {
        let body = serde_json::to_string(&CommandResult { success: false }).unwrap();
        assert_eq!(body, r#"{"success":false}"#);
    }
}
