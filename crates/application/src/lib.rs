//! 应用层实现。
//!
//! 这里是私聊客户端的会话同步核心：连接管理、在线列表协调、会话存储，
//! 以及把三者组合起来并跟随认证状态的会话门面与调度器。
//! 真实网络传输由基础设施层实现 [`transport::Connector`]。

pub mod auth;
pub mod clock;
pub mod connection;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod session;
pub mod transport;

pub use auth::AuthProvider;
pub use clock::{Clock, SystemClock};
pub use connection::{ConnectionEvent, ConnectionManager};
pub use conversation::ConversationStore;
pub use dispatcher::{SessionCommand, SessionDispatcher, SessionHandle};
pub use error::{ConnectionError, SessionError, TransportError};
pub use presence::PresenceReconciler;
pub use session::{ChatSession, ChatSessionDependencies, SessionUpdate};
pub use transport::{Connector, Link};
