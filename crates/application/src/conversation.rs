//! 会话存储
//!
//! 为每个会话维护按到达顺序追加的消息日志，统一本地乐观发送与远端消息两种来源。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ConversationKey, Identity, Message, MessageId, Timestamp};

use crate::clock::Clock;

pub struct ConversationStore {
    logs: HashMap<ConversationKey, Vec<Message>>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            logs: HashMap::new(),
            clock,
        }
    }

    /// 记录一次本地发送
    ///
    /// 立即且无条件追加，返回构造出的消息供调用方交给连接发送。
    pub fn record_local_send(
        &mut self,
        self_id: &Identity,
        peer_id: &Identity,
        text: impl Into<String>,
    ) -> Message {
        let message = Message::new(
            MessageId::generate(),
            text,
            self_id.clone(),
            self.clock.now(),
        );
        self.append(ConversationKey::between(self_id, peer_id), message)
    }

    /// 记录一条远端消息，严格追加
    pub fn record_remote(
        &mut self,
        from_id: &Identity,
        to_id: &Identity,
        text: impl Into<String>,
        server_timestamp: Timestamp,
    ) -> Message {
        let message = Message::new(MessageId::generate(), text, from_id.clone(), server_timestamp);
        self.append(ConversationKey::between(from_id, to_id), message)
    }

    /// 带幂等键记录远端消息
    ///
    /// 服务端把发送者自己的消息回显回来时，`client_message_id` 与已追加的本地消息ID相同，
    /// 此时跳过插入并返回 `None`。
    pub fn record_remote_idempotent(
        &mut self,
        from_id: &Identity,
        to_id: &Identity,
        text: impl Into<String>,
        server_timestamp: Timestamp,
        client_message_id: MessageId,
    ) -> Option<Message> {
        let key = ConversationKey::between(from_id, to_id);
        let already_recorded = self
            .logs
            .get(&key)
            .is_some_and(|log| log.iter().any(|message| message.id == client_message_id));
        if already_recorded {
            tracing::debug!(conversation = %key, message_id = %client_message_id, "忽略回显的本地消息");
            return None;
        }
        Some(self.record_remote(from_id, to_id, text, server_timestamp))
    }

    /// 读取会话日志快照；没有消息时返回空序列
    pub fn get_log(&self, self_id: &Identity, peer_id: &Identity) -> Vec<Message> {
        self.log(&ConversationKey::between(self_id, peer_id)).to_vec()
    }

    pub fn log(&self, key: &ConversationKey) -> &[Message] {
        self.logs.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn conversations(&self) -> impl Iterator<Item = &ConversationKey> {
        self.logs.keys()
    }

    pub fn len(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.values().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }

    fn append(&mut self, key: ConversationKey, message: Message) -> Message {
        self.logs.entry(key).or_default().push(message.clone());
        message
    }
}
