//! 领域模型错误定义
//!
//! 包括值对象校验错误和入站帧解码错误。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("无效参数 {field}: {message}")]
    InvalidArgument { field: String, message: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 入站帧解码错误
///
/// 始终是非致命的：解码失败的帧被丢弃，不会传递给下游组件。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// 不是合法的JSON
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// 信封缺少 eventname
    #[error("envelope is missing eventname")]
    MissingEventName,

    /// 未知的事件名
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// 未知的在线列表类型
    #[error("unknown chatlist type: {0}")]
    UnknownRosterType(String),

    /// 载荷结构不符
    #[error("invalid payload for {event}: {message}")]
    InvalidPayload { event: String, message: String },
}

impl DecodeError {
    pub fn invalid_payload(event: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
