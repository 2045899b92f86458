//! 私聊客户端核心领域模型
//!
//! 包含身份、会话键、在线列表项、消息等值对象与实体，以及 WebSocket 线协议。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
