use anyhow::{anyhow, Result};
use futures_util::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::domain::message::ErrorResponse as ErrorFrame;
use crate::error::{ChatError, ValidationError};
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service::delivery::reply;
use crate::ws::sender::{write_loop, WriteLoopConfig};

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// 从升级请求中取出身份：路径必须匹配，`user_id` 必须是 UUID
/// Extract the identity from the upgrade request: the path must match and
/// `user_id` must be a UUID
pub fn identity_from_uri(uri: &Uri, ws_path: &str) -> std::result::Result<String, ErrorResponse> {
    if uri.path() != ws_path {
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }
    let user_id = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "user_id")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
        .unwrap_or_default();
    match uuid::Uuid::parse_str(&user_id) {
        Ok(_) => Ok(user_id),
        Err(_) => Err(reject(
            StatusCode::BAD_REQUEST,
            "invalid user_id, must be UUID",
        )),
    }
}

/// 处理新连接：握手鉴权 -> 注册 -> 读写循环 -> 收尾
/// Handle a new connection: authorise the handshake, register, run both loops, tear down
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: ChatServer,
    ws_path: Arc<str>,
) -> Result<()> {
    let mut identity = None;
    let ws_stream = accept_hdr_async(
        stream,
        |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            identity = Some(identity_from_uri(req.uri(), &ws_path)?);
            Ok(response)
        },
    )
    .await?;
    let identity = identity.ok_or_else(|| anyhow!("handshake finished without identity"))?;

    let (conn, outbound) = server.registry.add(&identity);
    info!(
        "✅ User {} connected from {} (session {})",
        identity,
        peer_addr,
        conn.session_id()
    );
    server.touch_presence(&identity).await;

    let (sink, stream) = ws_stream.split();
    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        conn.done().clone(),
        WriteLoopConfig {
            ping_interval: server.config.ping_interval,
            write_timeout: server.config.write_timeout,
        },
        identity.clone(),
    ));

    if let Err(e) = server.read_loop(stream, &conn).await {
        debug!("read loop for {} ended: {}", identity, e);
    }

    // 收尾：结束信号是两个循环共同观察的同步点
    // Drain: the done signal is the point both loops observe
    conn.close();
    server.registry.remove_session(&identity, conn.session_id());
    if let Err(e) = writer.await {
        warn!("write loop for {} panicked: {}", identity, e);
    }
    server.touch_presence(&identity).await;
    info!("👋 User {} disconnected (session {})", identity, conn.session_id());
    Ok(())
}

impl ChatServer {
    /// 读循环：顺序解码，逐事件派发；读截止时间由 Ping/Pong 续期
    /// Read loop: frames are decoded in order and dispatched per event; the read
    /// deadline is renewed by Ping/Pong
    pub async fn read_loop<S>(&self, mut stream: S, conn: &Arc<Connection>) -> std::result::Result<(), ChatError>
    where
        S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        let read_timeout = self.config.read_timeout;
        let inflight = Arc::new(Semaphore::new(self.config.max_inflight_events.max(1)));
        let mut deadline = Instant::now() + read_timeout;

        loop {
            let next = tokio::select! {
                _ = conn.done().closed() => return Ok(()),
                next = timeout_at(deadline, stream.next()) => next,
            };
            let message = match next {
                Err(_) => return Err(ChatError::Transport("read deadline exceeded".to_string())),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(ChatError::Transport(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => self.dispatch_frame(conn, &text, &inflight).await,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch_frame(conn, &text, &inflight).await,
                    Err(e) => reply(
                        conn,
                        ErrorFrame::from(&ValidationError::InvalidFrame(e.to_string())),
                    ),
                },
                Message::Ping(_) | Message::Pong(_) => {
                    deadline = Instant::now() + read_timeout;
                }
                Message::Close(_) => return Ok(()),
                Message::Frame(_) => {}
            }
        }
    }
}
