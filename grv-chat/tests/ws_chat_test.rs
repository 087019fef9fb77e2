//! 端到端：真实监听器 + tokio-tungstenite 客户端
//! End to end: a real listener driven by tokio-tungstenite clients

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use grv_chat::service::history::HistoryQuery;
use grv_chat::storage::{MemoryMessageStore, MessageStore};
use grv_chat::ChatServer;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WS_PATH: &str = "/ws/chat";

async fn start(server: ChatServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener, WS_PATH).await;
    });
    addr
}

fn memory_server() -> ChatServer {
    ChatServer::default().with_store(Arc::new(MemoryMessageStore::new()))
}

fn new_user() -> String {
    Uuid::new_v4().to_string()
}

async fn connect(server: &ChatServer, addr: SocketAddr, user: &str) -> Client {
    let url = format!("ws://{}{}?user_id={}", addr, WS_PATH, user);
    let (ws, _) = connect_async(url).await.unwrap();
    wait_until(|| server.registry.is_online(user)).await;
    ws
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_online_delivery_and_sent_ack() {
    let server = memory_server();
    let addr = start(server.clone()).await;
    let (alice, bob) = (new_user(), new_user());
    let mut a = connect(&server, addr, &alice).await;
    let mut b = connect(&server, addr, &bob).await;

    send_json(&mut a, json!({"receiver_id": bob, "content": "hi"})).await;

    let delivered = next_json(&mut b).await;
    assert_eq!(delivered["sender_id"], alice.as_str());
    assert_eq!(delivered["content"], "hi");
    assert!(delivered["store_id"].is_i64());

    let ack = next_json(&mut a).await;
    assert_eq!(ack["status"], "sent");
    assert_eq!(ack["message_id"], delivered["id"]);
}

#[tokio::test]
async fn test_offline_receiver_queued_then_history() {
    let server = memory_server();
    let addr = start(server.clone()).await;
    let (alice, bob) = (new_user(), new_user());
    let mut a = connect(&server, addr, &alice).await;

    send_json(&mut a, json!({"receiver_id": bob, "content": "are you there?"})).await;
    let ack = next_json(&mut a).await;
    assert_eq!(ack["status"], "queued");

    let _b = connect(&server, addr, &bob).await;
    let query = HistoryQuery {
        user_id: bob.clone(),
        peer_id: alice.clone(),
        limit: Some(50),
        before: Some(chrono::Utc::now().timestamp() + 60),
    };
    let history = server.get_history(&bob, &query).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id, alice);
    assert_eq!(history[0].content, "are you there?");
}

#[tokio::test]
async fn test_read_receipt_reaches_sender_once() {
    let server = memory_server();
    let addr = start(server.clone()).await;
    let (alice, bob) = (new_user(), new_user());
    let mut a = connect(&server, addr, &alice).await;
    let mut b = connect(&server, addr, &bob).await;

    send_json(&mut a, json!({"receiver_id": bob, "content": "one"})).await;
    send_json(&mut a, json!({"receiver_id": bob, "content": "two"})).await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let msg = next_json(&mut b).await;
        ids.push(msg["store_id"].as_i64().unwrap().to_string());
    }
    for _ in 0..2 {
        assert_eq!(next_json(&mut a).await["status"], "sent");
    }

    send_json(&mut b, json!({"event_type": "message_read", "message_ids": ids})).await;
    let receipt = next_json(&mut a).await;
    assert_eq!(receipt["event_type"], "message_read");
    assert_eq!(receipt["read_by"], bob.as_str());
    let mut got: Vec<String> = receipt["message_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    got.sort();
    ids.sort();
    assert_eq!(got, ids);

    // 没有第二条回执 / no second notification
    assert!(tokio::time::timeout(Duration::from_millis(200), a.next()).await.is_err());
}

#[tokio::test]
async fn test_reconnect_supersedes_previous_session() {
    let server = memory_server();
    let addr = start(server.clone()).await;
    let (alice, bob) = (new_user(), new_user());
    let mut first = connect(&server, addr, &alice).await;
    let old_session = server.registry.get(&alice).unwrap().session_id();

    let url = format!("ws://{}{}?user_id={}", addr, WS_PATH, alice);
    let (mut second, _) = connect_async(url).await.unwrap();
    wait_until(|| {
        server
            .registry
            .get(&alice)
            .map(|c| c.session_id() != old_session)
            .unwrap_or(false)
    })
    .await;

    // 旧连接收到 Close / the old socket is closed
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    // 旧会话收尾后新会话仍在线 / the successor survives the old teardown
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.registry.is_online(&alice));
    assert_eq!(server.registry.len(), 1);

    let mut b = connect(&server, addr, &bob).await;
    send_json(&mut b, json!({"receiver_id": alice, "content": "still there?"})).await;
    assert_eq!(next_json(&mut second).await["content"], "still there?");
}

#[tokio::test]
async fn test_handshake_rejects_bad_identity_and_path() {
    let server = memory_server();
    let addr = start(server.clone()).await;

    match connect_async(format!("ws://{}{}?user_id=not-a-uuid", addr, WS_PATH)).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }
    match connect_async(format!("ws://{}/elsewhere?user_id={}", addr, new_user())).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 404),
        other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
    }
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let server = memory_server();
    let addr = start(server.clone()).await;
    let (alice, bob) = (new_user(), new_user());
    let mut a = connect(&server, addr, &alice).await;

    a.send(Message::Text("{definitely not json".into())).await.unwrap();
    let err = next_json(&mut a).await;
    assert_eq!(err["error"], "invalid message format");
    assert_eq!(err["code"], "invalid_payload");

    send_json(&mut a, json!({"receiver_id": alice, "content": "me"})).await;
    assert_eq!(next_json(&mut a).await["error"], "cannot send messages to yourself");

    send_json(&mut a, json!({"receiver_id": bob, "content": "ok"})).await;
    assert_eq!(next_json(&mut a).await["status"], "queued");
}

#[tokio::test]
async fn test_disconnect_deregisters_and_updates_presence() {
    let store = Arc::new(MemoryMessageStore::new());
    let server = ChatServer::default().with_store(store.clone());
    let addr = start(server.clone()).await;
    let alice = new_user();

    let mut a = connect(&server, addr, &alice).await;
    wait_until(|| store.last_active(&alice).is_some()).await;
    // 回拨活跃时间，断开后必须被刷新 / rewind it so the disconnect must refresh it
    store.update_last_active(&alice, 1).await.unwrap();

    a.close(None).await.unwrap();
    wait_until(|| !server.registry.is_online(&alice)).await;
    assert!(server.online_snapshot().online_users.is_empty());
    wait_until(|| store.last_active(&alice) > Some(1)).await;
}
