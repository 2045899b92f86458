//! 领域实体定义
//!
//! 包含在线列表项、私聊消息、连接状态以及线协议事件。

pub mod connection;
pub mod message;
pub mod presence;
pub mod websocket;

// 重新导出核心实体
pub use connection::ConnectionState;
pub use message::Message;
pub use presence::PresenceEntry;
pub use websocket::{
    decode_envelope, decode_frame, ClientEvent, InboundMessage, OutboundMessage, RosterEvent,
    ServerEvent,
};
