#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

/// 测试中等待异步结果的上限
pub const WAIT: Duration = Duration::from_secs(2);

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("operation timed out")
}

pub fn envelope(eventname: &str, eventpayload: Value) -> Value {
    json!({ "eventname": eventname, "eventpayload": eventpayload })
}

pub fn roster(kind: &str, chatlist: Value) -> Value {
    envelope("chatlist-response", json!({ "type": kind, "chatlist": chatlist }))
}

pub fn message_response(from: &str, to: &str, text: &str) -> Value {
    envelope(
        "message-response",
        json!({ "message": text, "fromUserID": from, "toUserID": to }),
    )
}
