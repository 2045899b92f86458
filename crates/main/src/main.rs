//! 主应用程序入口
//!
//! 启动终端私聊客户端：加载配置、建立会话调度器，从标准输入读取命令并打印会话更新。

mod cli;

use std::sync::Arc;

use application::{
    AuthProvider, ChatSession, ChatSessionDependencies, SessionDispatcher, SessionError,
    SessionHandle, SessionUpdate, SystemClock,
};
use cli::Command;
use config::ClientConfig;
use infrastructure::WebSocketConnector;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::load()?;

    // 初始化日志，RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(server = %config.server.base_url, "聊天客户端启动");

    let session = ChatSession::new(ChatSessionDependencies {
        connector: Arc::new(WebSocketConnector::new(config.server.clone())),
        clock: Arc::new(SystemClock),
        echo_policy: config.session.echo_policy,
        update_buffer: config.session.update_buffer,
    });
    let auth = AuthProvider::new();
    let (dispatcher, handle) =
        SessionDispatcher::new(session, auth.subscribe(), config.session.command_buffer);
    let dispatcher_task = tokio::spawn(dispatcher.run());
    let printer_task = tokio::spawn(print_updates(handle.subscribe(), auth.clone()));

    println!("{}", cli::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match cli::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => run_command(command, &auth, &handle).await,
            Ok(None) => {}
            Err(err) => println!("{err}"),
        }
    }

    handle.shutdown().await;
    dispatcher_task.await?;
    printer_task.abort();
    tracing::info!("聊天客户端退出");
    Ok(())
}

async fn run_command(command: Command, auth: &AuthProvider, handle: &SessionHandle) {
    let result = match command {
        Command::Login(identity) => {
            auth.sign_in(identity);
            Ok(())
        }
        Command::Logout => {
            auth.sign_out();
            Ok(())
        }
        Command::Who => handle.roster().await.map(|roster| {
            if roster.is_empty() {
                println!("当前没有其他在线用户");
            }
            for entry in roster {
                println!("  {} ({})", entry.display_name, entry.user_id);
            }
        }),
        Command::Msg { peer, text } => handle.send_message(peer, text).await.map(|_| ()),
        Command::Log(peer) => handle.conversation(peer).await.map(|log| {
            for message in log {
                println!(
                    "  [{}] {}: {}",
                    message.timestamp.format("%H:%M:%S"),
                    message.sender_id,
                    message.text
                );
            }
        }),
        Command::Reconnect => handle.reconnect().await,
        Command::Help => {
            println!("{}", cli::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(err) = result {
        print_error(&err);
    }
}

fn print_error(err: &SessionError) {
    match err {
        SessionError::NotDelivered { .. } => println!("消息已记录但未发送: {err}"),
        other => println!("错误: {other}"),
    }
}

async fn print_updates(mut updates: broadcast::Receiver<SessionUpdate>, auth: AuthProvider) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::ConnectionChanged(state)) => println!("* 连接状态: {state}"),
            Ok(SessionUpdate::RosterChanged(roster)) => {
                let names: Vec<_> = roster.iter().map(|entry| entry.display_name.as_str()).collect();
                println!("* 在线: [{}]", names.join(", "));
            }
            Ok(SessionUpdate::MessageAppended { message, .. }) => {
                // 自己发出的消息已在输入时可见
                if auth.current().as_ref() != Some(&message.sender_id) {
                    println!("<{}> {}", message.sender_id, message.text);
                }
            }
            Ok(SessionUpdate::DecodeError(err)) => tracing::debug!(error = %err, "忽略无法解码的帧"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "更新接收落后，部分通知已丢失");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
