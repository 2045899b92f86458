use domain::{ConnectionState, Message};
use thiserror::Error;

/// 传输层错误
///
/// 只在连接管理器内部出现，对外体现为连接状态迁移到 `Closed`。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport io error: {0}")]
    Io(String),
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    /// 重复打开连接（调用方误用）
    #[error("connection already open (state: {0})")]
    AlreadyOpen(ConnectionState),
    /// 未处于 Joined 状态时发送（可恢复）
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no identity signed in")]
    NotSignedIn,
    #[error("message text is empty")]
    EmptyMessage,
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    /// 乐观追加已完成，但消息未能交给连接发送
    #[error("message {} recorded but not sent: {source}", .message.id)]
    NotDelivered {
        message: Box<Message>,
        #[source]
        source: ConnectionError,
    },
    #[error("session dispatcher is gone")]
    DispatcherGone,
}

impl SessionError {
    /// 返回已乐观记录的消息（如果有）
    pub fn recorded_message(&self) -> Option<&Message> {
        match self {
            Self::NotDelivered { message, .. } => Some(message.as_ref()),
            _ => None,
        }
    }
}
