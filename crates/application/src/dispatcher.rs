//! 会话调度器
//!
//! 单一事件驱动调度任务独占 [`ChatSession`]：认证变化、表现层命令和入站连接事件
//! 都在同一个 `select!` 循环里串行处理，不存在对在线列表或会话日志的并行修改。

use domain::{ConnectionState, Identity, Message, PresenceEntry};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::SessionError;
use crate::session::{ChatSession, SessionUpdate};

/// 表现层发往调度器的命令
#[derive(Debug)]
pub enum SessionCommand {
    SendMessage {
        peer: Identity,
        text: String,
        reply: oneshot::Sender<Result<Message, SessionError>>,
    },
    Roster {
        reply: oneshot::Sender<Vec<PresenceEntry>>,
    },
    Conversation {
        peer: Identity,
        reply: oneshot::Sender<Vec<Message>>,
    },
    ConnectionState {
        reply: oneshot::Sender<ConnectionState>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown,
}

/// 表现层持有的会话句柄
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub async fn send_message(
        &self,
        peer: Identity,
        text: impl Into<String>,
    ) -> Result<Message, SessionError> {
        let text = text.into();
        self.request(|reply| SessionCommand::SendMessage { peer, text, reply })
            .await?
    }

    pub async fn roster(&self) -> Result<Vec<PresenceEntry>, SessionError> {
        self.request(|reply| SessionCommand::Roster { reply }).await
    }

    pub async fn conversation(&self, peer: Identity) -> Result<Vec<Message>, SessionError> {
        self.request(|reply| SessionCommand::Conversation { peer, reply })
            .await
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, SessionError> {
        self.request(|reply| SessionCommand::ConnectionState { reply })
            .await
    }

    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Reconnect { reply })
            .await?
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::DispatcherGone)?;
        response.await.map_err(|_| SessionError::DispatcherGone)
    }
}

pub struct SessionDispatcher {
    session: ChatSession,
    commands: mpsc::Receiver<SessionCommand>,
    auth: watch::Receiver<Option<Identity>>,
}

impl SessionDispatcher {
    pub fn new(
        session: ChatSession,
        auth: watch::Receiver<Option<Identity>>,
        command_buffer: usize,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(command_buffer.max(1));
        let handle = SessionHandle {
            commands: commands_tx,
            updates: session.update_sender(),
        };
        let dispatcher = Self {
            session,
            commands: commands_rx,
            auth,
        };
        (dispatcher, handle)
    }

    /// 运行调度循环，直到收到 `Shutdown` 或所有句柄被释放
    pub async fn run(mut self) {
        let initial = self.auth.borrow_and_update().clone();
        self.apply_auth(initial);

        let mut auth_open = true;
        loop {
            tokio::select! {
                changed = self.auth.changed(), if auth_open => {
                    if changed.is_err() {
                        // 认证提供者已释放，视为登出
                        auth_open = false;
                        self.session.sign_out();
                        continue;
                    }
                    let identity = self.auth.borrow_and_update().clone();
                    self.apply_auth(identity);
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.session.next_connection_event() => {
                    self.session.handle_connection_event(event);
                }
            }
        }

        self.session.shutdown().await;
        tracing::info!("会话调度器已停止");
    }

    fn apply_auth(&mut self, identity: Option<Identity>) {
        if let Err(err) = self.session.apply_auth(identity) {
            tracing::error!(error = %err, "应用认证状态失败");
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SendMessage { peer, text, reply } => {
                let _ = reply.send(self.session.send_message(&peer, &text));
            }
            SessionCommand::Roster { reply } => {
                let _ = reply.send(self.session.roster().to_vec());
            }
            SessionCommand::Conversation { peer, reply } => {
                let _ = reply.send(self.session.conversation(&peer));
            }
            SessionCommand::ConnectionState { reply } => {
                let _ = reply.send(self.session.connection_state());
            }
            SessionCommand::Reconnect { reply } => {
                let _ = reply.send(self.session.reconnect());
            }
            SessionCommand::Shutdown => {}
        }
    }
}
