//! 在线状态实体

use serde::{Deserialize, Serialize};

use crate::value_objects::Identity;

/// 在线列表中的一项
///
/// 对端连接期间存在；在快照或“用户加入”事件中创建，在“用户断开”事件中移除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// 用户ID
    #[serde(rename = "userID", alias = "userId", alias = "user_id")]
    pub user_id: Identity,
    /// 显示名称
    #[serde(rename = "username", alias = "displayName", alias = "display_name")]
    pub display_name: String,
}

impl PresenceEntry {
    pub fn new(user_id: impl Into<Identity>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_server_shape() {
        // 服务端额外携带 online 字段
        let entry: PresenceEntry =
            serde_json::from_value(json!({"userID": "U2", "username": "Bob", "online": "Y"}))
                .unwrap();
        assert_eq!(entry, PresenceEntry::new("U2", "Bob"));
    }

    #[test]
    fn test_deserialize_camel_case_aliases() {
        let entry: PresenceEntry =
            serde_json::from_value(json!({"userId": "U3", "displayName": "Carol"})).unwrap();
        assert_eq!(entry.user_id.as_str(), "U3");
        assert_eq!(entry.display_name, "Carol");
    }
}
