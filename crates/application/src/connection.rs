//! 连接管理器
//!
//! 每个登录身份持有一条持久连接。管理器把传输层的生命周期（建立、入站帧、错误、关闭）
//! 转换为类型化的 [`ConnectionEvent`]，并对外提供发送原语。
//!
//! 真正的 IO 在后台连接任务中进行；状态迁移只在 [`ConnectionManager::next_event`]
//! 中处理任务上报的事件时发生，因此状态始终由持有管理器的调度器独占修改。

use std::collections::VecDeque;
use std::sync::Arc;

use domain::{decode_frame, ClientEvent, ConnectionState, DecodeError, Identity, ServerEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, TransportError};
use crate::transport::{Connector, Link};

/// 连接管理器对外产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// 传输就绪，join 握手已发出
    Joined,
    /// 解码成功的入站事件
    Inbound(ServerEvent),
    /// 入站帧解码失败（已丢弃）
    DecodeFailed(DecodeError),
    /// 连接已关闭；`reason` 为 `None` 表示正常关闭
    Closed { reason: Option<TransportError> },
}

/// 连接任务上报的原始事件
#[derive(Debug)]
enum LinkEvent {
    Ready,
    Frame(String),
    Closed(Option<TransportError>),
}

/// 发往连接任务的写命令
#[derive(Debug)]
enum LinkCommand {
    Send(String),
    /// 关闭连接，可附带一条告别帧
    Close(Option<String>),
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    identity: Option<Identity>,
    commands: Option<mpsc::UnboundedSender<LinkCommand>>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    pending: VecDeque<ConnectionEvent>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: ConnectionState::Disconnected,
            identity: None,
            commands: None,
            events: None,
            pending: VecDeque::new(),
            task: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// 开始异步建立连接，不阻塞调用方
    pub fn open(&mut self, identity: Identity) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectionError::AlreadyOpen(self.state));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(drive_link(
            self.connector.clone(),
            identity.clone(),
            command_rx,
            event_tx,
        ));

        tracing::info!(identity = %identity, "开始建立连接");

        self.identity = Some(identity);
        self.commands = Some(command_tx);
        self.events = Some(event_rx);
        self.task = Some(task);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// 发送一个出站事件，仅在 `Joined` 状态下有效
    pub fn send(&mut self, event: ClientEvent) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Joined {
            return Err(ConnectionError::NotConnected(self.state));
        }

        let frame = event
            .to_frame()
            .map_err(|err| ConnectionError::Encode(err.to_string()))?;

        let delivered = self
            .commands
            .as_ref()
            .map(|commands| commands.send(LinkCommand::Send(frame)).is_ok())
            .unwrap_or(false);
        if !delivered {
            // 连接任务已退出，关闭事件随后由 next_event 上报
            tracing::warn!(event = event.event_name(), "connection task is gone, dropping outbound event");
        }
        Ok(())
    }

    /// 关闭连接
    ///
    /// 只要 join 已经发出（无论管理器是否已观察到就绪），连接任务都会先尽力发送
    /// `disconnect` 通知再关闭；建立连接前关闭则直接放弃。对已关闭的连接重复调用无副作用。
    ///
    /// 返回连接任务句柄，调用方可以等待告别帧真正写出。
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Closed => return None,
            ConnectionState::Connecting | ConnectionState::Joined => {
                let farewell = self
                    .identity
                    .clone()
                    .and_then(|identity| ClientEvent::Disconnect(identity).to_frame().ok());
                if let Some(commands) = &self.commands {
                    let _ = commands.send(LinkCommand::Close(farewell));
                }
            }
        }

        tracing::info!(identity = ?self.identity, state = %self.state, "关闭连接");
        let task = self.task.take();
        self.mark_closed();
        task
    }

    /// 等待下一个连接事件
    ///
    /// 没有活动连接时返回 `None`。
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let events = self.events.as_mut()?;
            match events.recv().await {
                Some(LinkEvent::Ready) => {
                    if self.state == ConnectionState::Connecting {
                        self.state = ConnectionState::Joined;
                        tracing::info!(identity = ?self.identity, "连接已建立，join 已发送");
                        return Some(ConnectionEvent::Joined);
                    }
                }
                Some(LinkEvent::Frame(text)) => self.decode_into_pending(&text),
                Some(LinkEvent::Closed(reason)) => {
                    match &reason {
                        Some(err) => tracing::warn!(error = %err, "连接异常关闭"),
                        None => tracing::info!("连接被服务器关闭"),
                    }
                    self.mark_closed();
                    return Some(ConnectionEvent::Closed { reason });
                }
                None => {
                    self.mark_closed();
                    return Some(ConnectionEvent::Closed { reason: None });
                }
            }
        }
    }

    fn decode_into_pending(&mut self, text: &str) {
        for result in decode_frame(text) {
            match result {
                Ok(event) => self.pending.push_back(ConnectionEvent::Inbound(event)),
                Err(err) => {
                    tracing::warn!(error = %err, "丢弃无法解码的入站帧");
                    self.pending.push_back(ConnectionEvent::DecodeFailed(err));
                }
            }
        }
    }

    fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.commands = None;
        self.events = None;
        self.task = None;
    }
}

/// 连接任务：建立连接、发送 join 握手，然后在入站帧与出站命令之间转发
async fn drive_link(
    connector: Arc<dyn Connector>,
    identity: Identity,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    // 建立连接期间只可能收到 Close；管理器被丢弃时通道关闭，同样放弃
    let connected = tokio::select! {
        result = connector.connect(&identity) => result,
        _ = commands.recv() => {
            tracing::debug!(identity = %identity, "连接建立前已关闭，放弃连接");
            return;
        }
    };
    let mut link = match connected {
        Ok(link) => link,
        Err(err) => {
            let _ = events.send(LinkEvent::Closed(Some(err)));
            return;
        }
    };

    // join 必须是第一条出站消息
    let handshake = match ClientEvent::Join(identity.clone()).to_frame() {
        Ok(frame) => frame,
        Err(err) => {
            let _ = link.close().await;
            let _ = events.send(LinkEvent::Closed(Some(TransportError::io(err.to_string()))));
            return;
        }
    };
    if let Err(err) = link.send(handshake).await {
        let _ = events.send(LinkEvent::Closed(Some(err)));
        return;
    }
    // 管理器可能已在握手期间关闭；排队的 Close 仍由 pump_link 处理
    let _ = events.send(LinkEvent::Ready);

    let reason = pump_link(link.as_mut(), &mut commands, &events).await;
    if let Some(reason) = reason {
        let _ = events.send(LinkEvent::Closed(reason));
    }
    tracing::debug!(identity = %identity, "连接任务结束");
}

/// 返回需要上报的关闭原因；管理器已不再监听时返回 `None`
async fn pump_link(
    link: &mut dyn Link,
    commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Option<Option<TransportError>> {
    loop {
        tokio::select! {
            // 出站命令优先，保证 close 前排队的告别帧先于入站处理
            biased;

            command = commands.recv() => match command {
                Some(LinkCommand::Send(frame)) => {
                    if let Err(err) = link.send(frame).await {
                        tracing::warn!(error = %err, "发送出站帧失败");
                        return Some(Some(err));
                    }
                }
                Some(LinkCommand::Close(farewell)) => {
                    if let Some(frame) = farewell {
                        if let Err(err) = link.send(frame).await {
                            tracing::debug!(error = %err, "disconnect 通知发送失败");
                        }
                    }
                    if let Err(err) = link.close().await {
                        tracing::debug!(error = %err, "关闭传输失败");
                    }
                    return Some(None);
                }
                None => {
                    let _ = link.close().await;
                    return None;
                }
            },
            frame = link.recv() => match frame {
                Some(Ok(text)) => {
                    if events.send(LinkEvent::Frame(text)).is_err() {
                        let _ = link.close().await;
                        return None;
                    }
                }
                Some(Err(err)) => return Some(Some(err)),
                None => return Some(None),
            },
        }
    }
}
