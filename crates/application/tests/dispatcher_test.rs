//! 会话调度器测试：认证状态驱动连接生命周期，句柄命令串行执行

mod common;

use std::sync::Arc;

use application::transport::memory::{MemoryConnector, MemoryServer};
use application::{
    AuthProvider, ChatSession, ChatSessionDependencies, SessionDispatcher, SessionError,
    SessionHandle, SessionUpdate, SystemClock,
};
use common::{envelope, message_response, roster, within};
use config::EchoPolicy;
use domain::{ConnectionState, Identity, PresenceEntry};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct Harness {
    auth: AuthProvider,
    handle: SessionHandle,
    updates: broadcast::Receiver<SessionUpdate>,
    server: MemoryServer,
    task: JoinHandle<()>,
}

fn start() -> Harness {
    let (connector, server) = MemoryConnector::new();
    let session = ChatSession::new(ChatSessionDependencies {
        connector: Arc::new(connector),
        clock: Arc::new(SystemClock),
        echo_policy: EchoPolicy::default(),
        update_buffer: 64,
    });
    let auth = AuthProvider::new();
    let (dispatcher, handle) = SessionDispatcher::new(session, auth.subscribe(), 8);
    let updates = handle.subscribe();
    let task = tokio::spawn(dispatcher.run());
    Harness {
        auth,
        handle,
        updates,
        server,
        task,
    }
}

async fn wait_for(
    updates: &mut broadcast::Receiver<SessionUpdate>,
    predicate: impl Fn(&SessionUpdate) -> bool,
) {
    within(async {
        loop {
            let update = updates.recv().await.unwrap();
            if predicate(&update) {
                return;
            }
        }
    })
    .await
}

#[tokio::test]
async fn test_sign_in_connects_and_serves_commands() {
    let mut harness = start();

    harness.auth.sign_in(Identity::from("U1"));
    let mut peer = within(harness.server.accept()).await.unwrap();
    assert_eq!(
        within(peer.recv_json()).await,
        Some(envelope("join", json!("U1")))
    );
    wait_for(&mut harness.updates, |update| {
        *update == SessionUpdate::ConnectionChanged(ConnectionState::Joined)
    })
    .await;

    peer.send_json(&roster("snapshot", json!([{ "userId": "U2", "displayName": "Bob" }])));
    wait_for(&mut harness.updates, |update| {
        matches!(update, SessionUpdate::RosterChanged(_))
    })
    .await;
    assert_eq!(
        harness.handle.roster().await.unwrap(),
        vec![PresenceEntry::new("U2", "Bob")]
    );

    let sent = harness
        .handle
        .send_message(Identity::from("U2"), "hi")
        .await
        .unwrap();
    let frame = within(peer.recv_json()).await.unwrap();
    assert_eq!(frame["eventname"], "message");
    assert_eq!(frame["eventpayload"]["message"], "hi");

    peer.send_json(&message_response("U2", "U1", "yo"));
    wait_for(&mut harness.updates, |update| {
        matches!(update, SessionUpdate::MessageAppended { message, .. } if message.text == "yo")
    })
    .await;

    let log = harness
        .handle
        .conversation(Identity::from("U2"))
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0], sent);
    assert_eq!(log[1].text, "yo");

    harness.handle.shutdown().await;
    within(harness.task).await.unwrap();
}

#[tokio::test]
async fn test_sign_out_tears_down_session() {
    let mut harness = start();
    harness.auth.sign_in(Identity::from("U1"));
    let mut peer = within(harness.server.accept()).await.unwrap();
    within(peer.recv_json()).await.unwrap();
    wait_for(&mut harness.updates, |update| {
        *update == SessionUpdate::ConnectionChanged(ConnectionState::Joined)
    })
    .await;

    harness.auth.sign_out();

    assert_eq!(
        within(peer.recv_json()).await,
        Some(envelope("disconnect", json!("U1")))
    );
    assert_eq!(
        harness.handle.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert!(matches!(
        harness.handle.send_message(Identity::from("U2"), "hi").await,
        Err(SessionError::NotSignedIn)
    ));
}

#[tokio::test]
async fn test_manual_reconnect_after_drop() {
    let mut harness = start();
    harness.auth.sign_in(Identity::from("U1"));
    let mut peer = within(harness.server.accept()).await.unwrap();
    within(peer.recv_json()).await.unwrap();

    drop(peer);
    wait_for(&mut harness.updates, |update| {
        *update == SessionUpdate::ConnectionChanged(ConnectionState::Closed)
    })
    .await;

    harness.handle.reconnect().await.unwrap();
    let mut peer = within(harness.server.accept()).await.unwrap();
    assert_eq!(
        within(peer.recv_json()).await,
        Some(envelope("join", json!("U1")))
    );
}

#[tokio::test]
async fn test_dropped_auth_provider_signs_out() {
    let mut harness = start();
    harness.auth.sign_in(Identity::from("U1"));
    let mut peer = within(harness.server.accept()).await.unwrap();
    within(peer.recv_json()).await.unwrap();

    drop(harness.auth);

    wait_for(&mut harness.updates, |update| {
        *update == SessionUpdate::ConnectionChanged(ConnectionState::Disconnected)
    })
    .await;
    assert_eq!(
        harness.handle.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let harness = start();

    harness.handle.shutdown().await;
    within(harness.task).await.unwrap();

    assert!(matches!(
        harness.handle.roster().await,
        Err(SessionError::DispatcherGone)
    ));
}
