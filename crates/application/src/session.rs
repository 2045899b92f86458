//! 会话门面
//!
//! 组合连接管理器、在线列表协调器和会话存储，对表现层暴露：
//! - 当前在线列表与会话日志的只读访问
//! - `send_message`
//! - 跟随认证状态的连接/断开生命周期
//! - 状态变化的广播订阅

use std::sync::Arc;
use std::time::Duration;

use config::EchoPolicy;
use domain::{
    ClientEvent, ConnectionState, ConversationKey, DecodeError, Identity, InboundMessage, Message,
    OutboundMessage, PresenceEntry, ServerEvent,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::conversation::ConversationStore;
use crate::error::{ConnectionError, SessionError};
use crate::presence::PresenceReconciler;
use crate::transport::Connector;

/// 关闭时等待告别帧写出的上限
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 推送给表现层的状态更新
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    ConnectionChanged(ConnectionState),
    RosterChanged(Vec<PresenceEntry>),
    MessageAppended {
        conversation: ConversationKey,
        message: Message,
    },
    DecodeError(DecodeError),
}

pub struct ChatSessionDependencies {
    pub connector: Arc<dyn Connector>,
    pub clock: Arc<dyn Clock>,
    pub echo_policy: EchoPolicy,
    pub update_buffer: usize,
}

pub struct ChatSession {
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    echo_policy: EchoPolicy,
    identity: Option<Identity>,
    connection: ConnectionManager,
    roster: PresenceReconciler,
    conversations: ConversationStore,
    updates: broadcast::Sender<SessionUpdate>,
    /// 最近一次关闭的连接任务
    closing: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(deps: ChatSessionDependencies) -> Self {
        let ChatSessionDependencies {
            connector,
            clock,
            echo_policy,
            update_buffer,
        } = deps;
        let (updates, _) = broadcast::channel(update_buffer.max(1));

        Self {
            connection: ConnectionManager::new(connector.clone()),
            conversations: ConversationStore::new(clock.clone()),
            roster: PresenceReconciler::new(),
            identity: None,
            connector,
            clock,
            echo_policy,
            updates,
            closing: None,
        }
    }

    /// 订阅状态更新
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn update_sender(&self) -> broadcast::Sender<SessionUpdate> {
        self.updates.clone()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn roster(&self) -> &[PresenceEntry] {
        self.roster.roster()
    }

    /// 当前用户与指定对端的会话日志
    pub fn conversation(&self, peer_id: &Identity) -> Vec<Message> {
        match &self.identity {
            Some(self_id) => self.conversations.get_log(self_id, peer_id),
            None => Vec::new(),
        }
    }

    /// 跟随认证状态：身份变化时完全拆除并重建
    pub fn apply_auth(&mut self, identity: Option<Identity>) -> Result<(), SessionError> {
        if identity == self.identity {
            return Ok(());
        }
        match identity {
            Some(identity) => self.sign_in(identity),
            None => {
                self.sign_out();
                Ok(())
            }
        }
    }

    /// 以新身份登录
    pub fn sign_in(&mut self, identity: Identity) -> Result<(), SessionError> {
        self.teardown();
        tracing::info!(identity = %identity, "会话登录");
        self.identity = Some(identity.clone());
        self.connection.open(identity)?;
        self.publish(SessionUpdate::ConnectionChanged(self.connection.state()));
        Ok(())
    }

    /// 登出：关闭连接并丢弃全部会话状态
    pub fn sign_out(&mut self) {
        if self.identity.is_none() && self.connection.state() == ConnectionState::Disconnected {
            return;
        }
        tracing::info!(identity = ?self.identity, "会话登出");
        self.teardown();
        self.publish(SessionUpdate::ConnectionChanged(self.connection.state()));
    }

    /// 登出并等待连接任务写完 `disconnect` 通知，最多等待 [`CLOSE_GRACE`]
    pub async fn shutdown(&mut self) {
        self.sign_out();
        if let Some(task) = self.closing.take() {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                tracing::warn!("等待连接关闭超时");
            }
        }
    }

    /// 手动重连：仅在连接已关闭时为当前身份建立新连接
    pub fn reconnect(&mut self) -> Result<(), SessionError> {
        let identity = self.identity.clone().ok_or(SessionError::NotSignedIn)?;
        let state = self.connection.state();
        if state != ConnectionState::Closed && state != ConnectionState::Disconnected {
            return Err(ConnectionError::AlreadyOpen(state).into());
        }

        // 服务器会在 join 后重新下发快照
        self.clear_roster();
        self.connection = ConnectionManager::new(self.connector.clone());
        self.connection.open(identity)?;
        self.publish(SessionUpdate::ConnectionChanged(self.connection.state()));
        Ok(())
    }

    /// 发送私聊消息
    ///
    /// 先乐观追加到会话日志，再交给连接发送；发送失败时追加仍然保留。
    pub fn send_message(&mut self, peer_id: &Identity, text: &str) -> Result<Message, SessionError> {
        let self_id = self.identity.clone().ok_or(SessionError::NotSignedIn)?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let message = self.conversations.record_local_send(&self_id, peer_id, text);
        self.publish(SessionUpdate::MessageAppended {
            conversation: ConversationKey::between(&self_id, peer_id),
            message: message.clone(),
        });

        let event = ClientEvent::Message(OutboundMessage {
            message: message.text.clone(),
            to_user_id: peer_id.clone(),
            from_user_id: self_id,
            client_message_id: Some(message.id),
        });
        match self.connection.send(event) {
            Ok(()) => Ok(message),
            Err(source) => {
                tracing::warn!(error = %source, peer = %peer_id, "消息已记录但未发送");
                Err(SessionError::NotDelivered {
                    message: Box::new(message),
                    source,
                })
            }
        }
    }

    /// 等待下一个连接事件；没有活动连接时永远挂起
    pub async fn next_connection_event(&mut self) -> ConnectionEvent {
        match self.connection.next_event().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    /// 分发一个连接事件到协调器或会话存储
    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Joined => {
                self.publish(SessionUpdate::ConnectionChanged(ConnectionState::Joined));
            }
            ConnectionEvent::Closed { reason } => {
                if let Some(err) = reason {
                    tracing::warn!(error = %err, "连接已断开，等待手动重连");
                }
                self.publish(SessionUpdate::ConnectionChanged(ConnectionState::Closed));
            }
            ConnectionEvent::DecodeFailed(err) => {
                self.publish(SessionUpdate::DecodeError(err));
            }
            ConnectionEvent::Inbound(ServerEvent::Roster(event)) => {
                if self.roster.apply(event) {
                    self.publish(SessionUpdate::RosterChanged(self.roster.roster().to_vec()));
                }
            }
            ConnectionEvent::Inbound(ServerEvent::Message(inbound)) => {
                self.handle_inbound_message(inbound);
            }
        }
    }

    /// 等待并处理下一个连接事件
    pub async fn pump(&mut self) {
        let event = self.next_connection_event().await;
        self.handle_connection_event(event);
    }

    fn handle_inbound_message(&mut self, inbound: InboundMessage) {
        let InboundMessage {
            message: text,
            from_user_id,
            to_user_id,
            client_message_id,
            timestamp,
        } = inbound;

        let conversation = ConversationKey::between(&from_user_id, &to_user_id);
        let addressed_to_us = self
            .identity
            .as_ref()
            .is_some_and(|identity| conversation.involves(identity));
        if !addressed_to_us {
            tracing::warn!(
                from = %from_user_id,
                to = %to_user_id,
                identity = ?self.identity,
                "丢弃与当前用户无关的消息"
            );
            return;
        }

        let timestamp = timestamp.unwrap_or_else(|| self.clock.now());

        let recorded = match (self.echo_policy, client_message_id) {
            (EchoPolicy::EchoToSender, Some(key)) => self.conversations.record_remote_idempotent(
                &from_user_id,
                &to_user_id,
                text,
                timestamp,
                key,
            ),
            _ => Some(
                self.conversations
                    .record_remote(&from_user_id, &to_user_id, text, timestamp),
            ),
        };

        if let Some(message) = recorded {
            self.publish(SessionUpdate::MessageAppended {
                conversation,
                message,
            });
        }
    }

    fn teardown(&mut self) {
        if let Some(task) = self.connection.close() {
            self.closing = Some(task);
        }
        self.connection = ConnectionManager::new(self.connector.clone());
        self.identity = None;
        self.conversations.clear();
        self.clear_roster();
    }

    fn clear_roster(&mut self) {
        if !self.roster.is_empty() {
            self.roster.clear();
            self.publish(SessionUpdate::RosterChanged(Vec::new()));
        }
    }

    fn publish(&self, update: SessionUpdate) {
        // 没有订阅者时发送失败是正常的
        let _ = self.updates.send(update);
    }
}
