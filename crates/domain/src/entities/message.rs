//! 消息实体定义

use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, MessageId, Timestamp};

/// 私聊消息
///
/// 创建后不可变，既不会被修改也不会被删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 会话内唯一的消息ID
    pub id: MessageId,
    /// 消息文本
    pub text: String,
    /// 发送者ID
    #[serde(rename = "senderId")]
    pub sender_id: Identity,
    /// 时间戳
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        text: impl Into<String>,
        sender_id: Identity,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            sender_id,
            timestamp,
        }
    }

    /// 是否由指定用户发送
    pub fn is_from(&self, identity: &Identity) -> bool {
        &self.sender_id == identity
    }
}
