//! 连接管理器测试
//!
//! 使用内存传输验证状态机、握手顺序与入站解码。

mod common;

use std::sync::Arc;

use application::transport::memory::{MemoryConnector, MemoryPeer, MemoryServer};
use application::{ConnectionError, ConnectionEvent, ConnectionManager, TransportError};
use common::{envelope, roster, within};
use domain::{
    ClientEvent, ConnectionState, DecodeError, Identity, OutboundMessage, PresenceEntry,
    RosterEvent, ServerEvent,
};
use serde_json::json;

fn manager() -> (ConnectionManager, MemoryServer) {
    let (connector, server) = MemoryConnector::new();
    (ConnectionManager::new(Arc::new(connector)), server)
}

/// 打开连接并完成 join 握手
async fn joined(manager: &mut ConnectionManager, server: &mut MemoryServer) -> MemoryPeer {
    manager.open(Identity::from("U1")).unwrap();
    let mut peer = within(server.accept()).await.unwrap();
    within(peer.recv_json()).await.unwrap();
    assert_eq!(within(manager.next_event()).await, Some(ConnectionEvent::Joined));
    peer
}

#[tokio::test]
async fn test_join_is_first_outbound_frame() {
    let (mut manager, mut server) = manager();
    manager.open(Identity::from("U1")).unwrap();
    assert_eq!(manager.state(), ConnectionState::Connecting);

    let mut peer = within(server.accept()).await.unwrap();
    assert_eq!(peer.identity(), &Identity::from("U1"));
    let first = within(peer.recv_json()).await.unwrap();
    assert_eq!(first, envelope("join", json!("U1")));

    assert_eq!(within(manager.next_event()).await, Some(ConnectionEvent::Joined));
    assert_eq!(manager.state(), ConnectionState::Joined);
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let (mut manager, _server) = manager();
    manager.open(Identity::from("U1")).unwrap();

    let err = manager.open(Identity::from("U1")).unwrap_err();

    assert_eq!(err, ConnectionError::AlreadyOpen(ConnectionState::Connecting));
}

#[tokio::test]
async fn test_send_before_joined_is_not_connected() {
    let (mut manager, _server) = manager();
    let event = ClientEvent::Message(OutboundMessage {
        message: "hi".to_string(),
        to_user_id: Identity::from("U2"),
        from_user_id: Identity::from("U1"),
        client_message_id: None,
    });

    assert_eq!(
        manager.send(event.clone()),
        Err(ConnectionError::NotConnected(ConnectionState::Disconnected))
    );

    manager.open(Identity::from("U1")).unwrap();
    assert_eq!(
        manager.send(event),
        Err(ConnectionError::NotConnected(ConnectionState::Connecting))
    );
}

#[tokio::test]
async fn test_send_when_joined_reaches_server() {
    let (mut manager, mut server) = manager();
    let mut peer = joined(&mut manager, &mut server).await;

    manager
        .send(ClientEvent::Message(OutboundMessage {
            message: "hi".to_string(),
            to_user_id: Identity::from("U2"),
            from_user_id: Identity::from("U1"),
            client_message_id: None,
        }))
        .unwrap();

    let frame = within(peer.recv_json()).await.unwrap();
    assert_eq!(
        frame,
        envelope(
            "message",
            json!({ "message": "hi", "toUserID": "U2", "fromUserID": "U1" })
        )
    );
}

#[tokio::test]
async fn test_close_sends_disconnect_then_closes() {
    let (mut manager, mut server) = manager();
    let mut peer = joined(&mut manager, &mut server).await;

    manager.close();
    assert_eq!(manager.state(), ConnectionState::Closed);

    let farewell = within(peer.recv_json()).await.unwrap();
    assert_eq!(farewell, envelope("disconnect", json!("U1")));
    assert_eq!(within(peer.recv_frame()).await, None);

    // 重复关闭无副作用
    manager.close();
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(manager.next_event().await, None);
}

#[tokio::test]
async fn test_close_after_join_sent_still_says_goodbye() {
    let (mut manager, mut server) = manager();
    manager.open(Identity::from("U1")).unwrap();
    let mut peer = within(server.accept()).await.unwrap();
    assert_eq!(
        within(peer.recv_json()).await,
        Some(envelope("join", json!("U1")))
    );
    // 服务器已收到 join，但管理器尚未处理就绪事件
    assert_eq!(manager.state(), ConnectionState::Connecting);

    let task = manager.close().unwrap();
    within(task).await.unwrap();

    assert_eq!(
        within(peer.recv_json()).await,
        Some(envelope("disconnect", json!("U1")))
    );
    assert_eq!(within(peer.recv_frame()).await, None);
}

#[tokio::test]
async fn test_close_while_connecting_aborts() {
    let (mut manager, _server) = manager();
    manager.open(Identity::from("U1")).unwrap();

    manager.close();

    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(
        manager.send(ClientEvent::Join(Identity::from("U1"))),
        Err(ConnectionError::NotConnected(ConnectionState::Closed))
    );
}

#[tokio::test]
async fn test_close_when_disconnected_is_noop() {
    let (mut manager, _server) = manager();
    manager.close();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_malformed_frame_does_not_break_stream() {
    let (mut manager, mut server) = manager();
    let peer = joined(&mut manager, &mut server).await;

    assert!(peer.send_frame("definitely not json"));
    assert!(peer.send_json(&envelope("typing", json!({}))));
    assert!(peer.send_json(&roster(
        "snapshot",
        json!([{ "userId": "U2", "displayName": "Bob" }])
    )));

    assert!(matches!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::DecodeFailed(DecodeError::Malformed(_)))
    ));
    assert_eq!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::DecodeFailed(DecodeError::UnknownEvent(
            "typing".to_string()
        )))
    );
    assert_eq!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::Inbound(ServerEvent::Roster(
            RosterEvent::Snapshot(vec![PresenceEntry::new("U2", "Bob")])
        )))
    );
    assert_eq!(manager.state(), ConnectionState::Joined);
}

#[tokio::test]
async fn test_batched_frame_decodes_in_order() {
    let (mut manager, mut server) = manager();
    let peer = joined(&mut manager, &mut server).await;

    let frame = format!(
        "{}\n{}",
        roster("joined", json!({ "userID": "U2", "username": "Bob" })),
        roster("left", json!("U2")),
    );
    assert!(peer.send_frame(frame));

    assert_eq!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::Inbound(ServerEvent::Roster(
            RosterEvent::Joined(PresenceEntry::new("U2", "Bob"))
        )))
    );
    assert_eq!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::Inbound(ServerEvent::Roster(RosterEvent::Left(
            Identity::from("U2")
        ))))
    );
}

#[tokio::test]
async fn test_server_close_transitions_to_closed() {
    let (mut manager, mut server) = manager();
    let peer = joined(&mut manager, &mut server).await;

    drop(peer);

    assert_eq!(
        within(manager.next_event()).await,
        Some(ConnectionEvent::Closed { reason: None })
    );
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_connect_failure_closes_without_joining() {
    let (mut manager, server) = manager();
    drop(server);

    manager.open(Identity::from("U1")).unwrap();

    match within(manager.next_event()).await {
        Some(ConnectionEvent::Closed {
            reason: Some(TransportError::Connect(_)),
        }) => {}
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(
        manager.open(Identity::from("U1")),
        Err(ConnectionError::AlreadyOpen(ConnectionState::Closed))
    );
}
