use std::fmt;

use serde::{Deserialize, Serialize};

/// 连接状态
///
/// `Disconnected -> Connecting -> Joined -> Closed`，`Closed` 对该连接实例是终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Joined,
    Closed,
}

impl ConnectionState {
    pub fn is_joined(self) -> bool {
        matches!(self, Self::Joined)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Joined => "joined",
            Self::Closed => "closed",
        };
        f.write_str(text)
    }
}
