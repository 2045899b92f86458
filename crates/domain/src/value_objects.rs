use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型，序列化为 ISO-8601。
pub type Timestamp = DateTime<Utc>;

/// 用户唯一标识。
///
/// 由服务端分配的不透明字符串，客户端不解析其结构。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("identity", "cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// 生成新的随机消息ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

/// 会话键。
///
/// 保存排序后的两个参与者标识，保证 `between(a, b) == between(b, a)`；
/// 展示形式为两者以 `_` 连接。按标识对比较而不是按连接后的字符串，
/// `("a_b", "c")` 与 `("a", "b_c")` 不会落到同一个会话。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    low: Identity,
    high: Identity,
}

impl ConversationKey {
    pub fn between(a: &Identity, b: &Identity) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.clone(),
            high: high.clone(),
        }
    }

    /// 排序后的参与者
    pub fn participants(&self) -> (&Identity, &Identity) {
        (&self.low, &self.high)
    }

    pub fn involves(&self, identity: &Identity) -> bool {
        &self.low == identity || &self.high == identity
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_rejects_blank() {
        assert!(Identity::parse("   ").is_err());
        assert_eq!(Identity::parse(" U1 ").unwrap().as_str(), "U1");
    }

    #[test]
    fn test_conversation_key_is_symmetric() {
        let pairs = [("U1", "U2"), ("b", "a"), ("same", "same"), ("", "x"), ("10", "9")];
        for (a, b) in pairs {
            let a = Identity::from(a);
            let b = Identity::from(b);
            assert_eq!(ConversationKey::between(&a, &b), ConversationKey::between(&b, &a));
        }
    }

    #[test]
    fn test_conversation_key_sorted_join() {
        let key = ConversationKey::between(&Identity::from("U2"), &Identity::from("U1"));
        assert_eq!(key.to_string(), "U1_U2");
        assert_eq!(key.participants(), (&Identity::from("U1"), &Identity::from("U2")));
    }

    #[test]
    fn test_conversation_key_does_not_collide_on_separator() {
        let left = ConversationKey::between(&Identity::from("a_b"), &Identity::from("c"));
        let right = ConversationKey::between(&Identity::from("a"), &Identity::from("b_c"));

        assert_eq!(left.to_string(), right.to_string());
        assert_ne!(left, right);
    }

    #[test]
    fn test_message_id_serializes_as_plain_string() {
        let id = MessageId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
