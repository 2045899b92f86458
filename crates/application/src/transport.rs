//! 传输层抽象
//!
//! 连接管理器只依赖这里的两个 trait：`Connector` 负责建立到服务器的持久连接，
//! `Link` 负责在已建立的连接上收发文本帧。

use async_trait::async_trait;
use domain::Identity;

use crate::error::TransportError;

/// 连接建立器
#[async_trait]
pub trait Connector: Send + Sync {
    /// 为指定用户建立一条持久连接
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn Link>, TransportError>;
}

/// 已建立的双向连接
///
/// `recv` 必须是取消安全的：连接任务在 `tokio::select!` 中同时等待入站帧和出站命令。
#[async_trait]
pub trait Link: Send {
    /// 发送一个文本帧
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// 接收下一个文本帧；对端关闭时返回 `None`
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// 主动关闭连接
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// 内存实现的传输层（用于测试和演示）
pub mod memory {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    /// 内存连接建立器
    ///
    /// 每次 `connect` 都会在 [`MemoryServer`] 一侧产生一个 [`MemoryPeer`]。
    #[derive(Clone)]
    pub struct MemoryConnector {
        accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    }

    /// 服务端句柄，接受客户端发起的连接
    pub struct MemoryServer {
        accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    }

    impl MemoryConnector {
        pub fn new() -> (Self, MemoryServer) {
            let (accept_tx, accept_rx) = mpsc::unbounded_channel();
            (Self { accept_tx }, MemoryServer { accept_rx })
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, identity: &Identity) -> Result<Box<dyn Link>, TransportError> {
            let (client_tx, server_rx) = mpsc::unbounded_channel();
            let (server_tx, client_rx) = mpsc::unbounded_channel();

            let peer = MemoryPeer {
                identity: identity.clone(),
                to_client: Some(server_tx),
                from_client: server_rx,
            };
            self.accept_tx
                .send(peer)
                .map_err(|_| TransportError::connect("memory server is not listening"))?;

            Ok(Box::new(MemoryLink {
                outbound: Some(client_tx),
                inbound: client_rx,
            }))
        }
    }

    impl MemoryServer {
        /// 等待下一个客户端连接
        pub async fn accept(&mut self) -> Option<MemoryPeer> {
            self.accept_rx.recv().await
        }
    }

    /// 服务端视角的一条连接
    pub struct MemoryPeer {
        identity: Identity,
        to_client: Option<mpsc::UnboundedSender<String>>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl MemoryPeer {
        /// 客户端建立连接时使用的身份
        pub fn identity(&self) -> &Identity {
            &self.identity
        }

        /// 接收客户端发来的下一个帧；客户端关闭后返回 `None`
        pub async fn recv_frame(&mut self) -> Option<String> {
            self.from_client.recv().await
        }

        /// 接收并解析为JSON
        pub async fn recv_json(&mut self) -> Option<Value> {
            let frame = self.recv_frame().await?;
            serde_json::from_str(&frame).ok()
        }

        /// 向客户端推送一个原始帧
        pub fn send_frame(&self, frame: impl Into<String>) -> bool {
            match &self.to_client {
                Some(tx) => tx.send(frame.into()).is_ok(),
                None => false,
            }
        }

        /// 向客户端推送一个JSON帧
        pub fn send_json(&self, value: &Value) -> bool {
            self.send_frame(value.to_string())
        }

        /// 服务端关闭连接
        pub fn close(&mut self) {
            self.to_client = None;
        }
    }

    struct MemoryLink {
        outbound: Option<mpsc::UnboundedSender<String>>,
        inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Link for MemoryLink {
        async fn send(&mut self, frame: String) -> Result<(), TransportError> {
            let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
            outbound.send(frame).map_err(|_| TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.outbound = None;
            self.inbound.close();
            Ok(())
        }
    }
}
