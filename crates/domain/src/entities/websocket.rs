//! WebSocket 线协议
//!
//! 每个帧承载一个或多个 `{eventname, eventpayload}` 信封。出站事件和入站事件都是
//! 封闭的标签联合，未知标签按解码错误处理。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::presence::PresenceEntry;
use crate::errors::DecodeError;
use crate::value_objects::{Identity, MessageId, Timestamp};

pub const EVENT_JOIN: &str = "join";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_CHATLIST_RESPONSE: &str = "chatlist-response";
pub const EVENT_MESSAGE_RESPONSE: &str = "message-response";

/// 客户端到服务器的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventname", content = "eventpayload")]
pub enum ClientEvent {
    /// 连接建立后的第一条消息，告知服务器连接者身份
    #[serde(rename = "join")]
    Join(Identity),
    /// 关闭前尽力发送的断开通知
    #[serde(rename = "disconnect")]
    Disconnect(Identity),
    /// 私聊消息
    #[serde(rename = "message")]
    Message(OutboundMessage),
}

impl ClientEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join(_) => EVENT_JOIN,
            Self::Disconnect(_) => EVENT_DISCONNECT,
            Self::Message(_) => EVENT_MESSAGE,
        }
    }

    /// 序列化为一个文本帧
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 出站私聊消息载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
    #[serde(rename = "toUserID")]
    pub to_user_id: Identity,
    #[serde(rename = "fromUserID")]
    pub from_user_id: Identity,
    /// 客户端生成的消息ID，服务端回显给发送者时用作幂等键
    #[serde(
        rename = "clientMessageID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_message_id: Option<MessageId>,
}

/// 服务器到客户端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// 在线列表事件（chatlist-response）
    Roster(RosterEvent),
    /// 收到的私聊消息（message-response）
    Message(InboundMessage),
}

/// 在线列表事件
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    /// 完整的在线列表，整体替换
    Snapshot(Vec<PresenceEntry>),
    /// 对端上线
    Joined(PresenceEntry),
    /// 对端下线
    Left(Identity),
}

/// 入站私聊消息载荷
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    pub message: String,
    #[serde(rename = "fromUserID", alias = "fromUserId")]
    pub from_user_id: Identity,
    #[serde(rename = "toUserID", alias = "toUserId")]
    pub to_user_id: Identity,
    #[serde(rename = "clientMessageID", alias = "clientMessageId", default)]
    pub client_message_id: Option<MessageId>,
    /// 服务端时间戳（可选），缺省时由客户端在接收时打时间戳
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(alias = "eventName", default)]
    eventname: Option<String>,
    #[serde(alias = "payload", default)]
    eventpayload: Value,
}

#[derive(Deserialize)]
struct RawRoster {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    chatlist: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LeftTarget {
    Id(Identity),
    Entry {
        #[serde(rename = "userID", alias = "userId", alias = "user_id")]
        user_id: Identity,
    },
}

impl From<LeftTarget> for Identity {
    fn from(value: LeftTarget) -> Self {
        match value {
            LeftTarget::Id(id) => id,
            LeftTarget::Entry { user_id } => user_id,
        }
    }
}

/// 解码一个文本帧
///
/// 服务端可能把多个排队的信封写进同一个帧（以换行分隔），这里按顺序逐个解码。
/// 一旦遇到无法解析的JSON，帧内剩余部分无法再同步，解码在此终止。
pub fn decode_frame(text: &str) -> Vec<Result<ServerEvent, DecodeError>> {
    let mut results = Vec::new();
    for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
        match value {
            Ok(value) => results.push(decode_envelope(value)),
            Err(err) => {
                results.push(Err(DecodeError::Malformed(err.to_string())));
                break;
            }
        }
    }
    results
}

/// 解码单个信封
pub fn decode_envelope(value: Value) -> Result<ServerEvent, DecodeError> {
    let envelope: RawEnvelope =
        serde_json::from_value(value).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let event = envelope.eventname.ok_or(DecodeError::MissingEventName)?;

    match event.as_str() {
        EVENT_CHATLIST_RESPONSE => decode_roster(envelope.eventpayload).map(ServerEvent::Roster),
        EVENT_MESSAGE_RESPONSE => serde_json::from_value::<InboundMessage>(envelope.eventpayload)
            .map(ServerEvent::Message)
            .map_err(|err| DecodeError::invalid_payload(EVENT_MESSAGE_RESPONSE, err)),
        _ => Err(DecodeError::UnknownEvent(event)),
    }
}

fn decode_roster(payload: Value) -> Result<RosterEvent, DecodeError> {
    let invalid = |err: serde_json::Error| DecodeError::invalid_payload(EVENT_CHATLIST_RESPONSE, err);
    let raw: RawRoster = serde_json::from_value(payload).map_err(invalid)?;

    // 兼容原服务端的 my-chatlist / new-user-joined / user-disconnected 标签
    match raw.kind.as_str() {
        "snapshot" | "my-chatlist" => {
            if raw.chatlist.is_null() {
                return Ok(RosterEvent::Snapshot(Vec::new()));
            }
            serde_json::from_value(raw.chatlist)
                .map(RosterEvent::Snapshot)
                .map_err(invalid)
        }
        "joined" | "new-user-joined" => serde_json::from_value(raw.chatlist)
            .map(RosterEvent::Joined)
            .map_err(invalid),
        "left" | "user-disconnected" => serde_json::from_value::<LeftTarget>(raw.chatlist)
            .map(|target| RosterEvent::Left(target.into()))
            .map_err(invalid),
        _ => Err(DecodeError::UnknownRosterType(raw.kind)),
    }
}
