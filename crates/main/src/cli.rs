//! 终端命令解析

use domain::Identity;
use thiserror::Error;

/// 终端输入的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(Identity),
    Logout,
    Who,
    Msg { peer: Identity, text: String },
    Log(Identity),
    Reconnect,
    Help,
    Quit,
}

pub const HELP: &str = "\
/login <id>         以指定身份登录
/logout             登出并丢弃会话
/who                查看在线用户
/msg <peer> <text>  发送私聊消息
/log <peer>         查看与某人的会话记录
/reconnect          连接断开后手动重连
/quit               退出";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

/// 解析一行输入；空行返回 `Ok(None)`
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let command = match name {
        "/login" => Command::Login(identity(rest, "/login <id>")?),
        "/logout" => Command::Logout,
        "/who" => Command::Who,
        "/msg" => {
            let (peer, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| usage("/msg <peer> <text>"))?;
            Command::Msg {
                peer: identity(peer, "/msg <peer> <text>")?,
                text: text.trim().to_string(),
            }
        }
        "/log" => Command::Log(identity(rest, "/log <peer>")?),
        "/reconnect" => Command::Reconnect,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(ParseError(format!("未知命令: {other}，输入 /help 查看帮助"))),
    };
    Ok(Some(command))
}

fn identity(value: &str, usage_text: &str) -> Result<Identity, ParseError> {
    Identity::parse(value).map_err(|_| usage(usage_text))
}

fn usage(text: &str) -> ParseError {
    ParseError(format!("用法: {text}"))
}
