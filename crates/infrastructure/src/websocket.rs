//! WebSocket 传输实现
//!
//! 基于 tokio-tungstenite 实现应用层的 [`Connector`] / [`Link`]，
//! 连接地址为 `{base_url}{ws_path}`，其中 `{identity}` 替换为登录身份。
//! `wss://` 地址经 rustls 建立 TLS，信任 webpki 根证书。

use application::{Connector, Link, TransportError};
use async_trait::async_trait;
use config::ServerConfig;
use domain::Identity;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket 连接建立器
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: ServerConfig,
}

impl WebSocketConnector {
    pub fn new(config: ServerConfig) -> Self {
        // 进程级只安装一次，重复安装返回 Err，忽略即可
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self { config }
    }

    pub fn url_for(&self, identity: &Identity) -> String {
        self.config.connect_url(identity.as_str())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn Link>, TransportError> {
        let url = self.url_for(identity);
        info!(url = %url, "连接WebSocket");

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::connect(err.to_string()))?;

        Ok(Box::new(WebSocketLink { stream }))
    }
}

/// 已建立的 WebSocket 连接
pub struct WebSocketLink {
    stream: WsStream,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(map_ws_error)
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(err) => warn!(error = %err, "丢弃非UTF-8的二进制帧"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "服务器关闭WebSocket");
                    return None;
                }
                // ping/pong 由 tungstenite 自动应答
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(err) => return Some(Err(map_ws_error(err))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(err) => Err(map_ws_error(err)),
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_substitutes_identity() {
        let connector = WebSocketConnector::new(ServerConfig {
            base_url: "ws://chat.local:8080".to_string(),
            ws_path: "/ws/{identity}".to_string(),
        });

        assert_eq!(
            connector.url_for(&Identity::from("U1")),
            "ws://chat.local:8080/ws/U1"
        );
    }

    #[test]
    fn test_closed_errors_map_to_closed() {
        assert_eq!(
            map_ws_error(tungstenite::Error::AlreadyClosed),
            TransportError::Closed
        );
        assert!(matches!(
            map_ws_error(tungstenite::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "boom"
            ))),
            TransportError::Io(_)
        ));
    }
}
