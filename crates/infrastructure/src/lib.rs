//! 基础设施层实现。
//!
//! 提供应用层传输接口的 WebSocket 适配器。

pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketLink};
