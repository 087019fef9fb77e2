use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::message::{ErrorResponse, InboundEvent};
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service::delivery::reply;

impl ChatServer {
    /// 解码一帧并派发到独立任务；解码失败回复错误响应，读循环继续
    /// Decode one frame and hand it to its own task; a malformed frame gets an error
    /// response and reading continues
    ///
    /// `inflight` 限制单连接同时处理的事件数，满时读循环在此等待。
    /// `inflight` caps concurrent events per connection; the read loop waits here when full.
    pub async fn dispatch_frame(&self, conn: &Arc<Connection>, text: &str, inflight: &Arc<Semaphore>) {
        let event = match InboundEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("📨 bad frame from {}: {:?}", conn.identity(), e);
                reply(conn, ErrorResponse::from(&e));
                return;
            }
        };

        let permit = match inflight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let server = self.clone();
        let conn = conn.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = match event {
                InboundEvent::Message(msg) => server.process_message(&conn, msg).await.map(|_| ()),
                InboundEvent::ReadReceipt(req) => {
                    server.process_read_receipt(&conn, req).await.map(|_| ())
                }
            };
            if let Err(e) = outcome {
                debug!("event from {} not completed: {}", conn.identity(), e);
            }
        });
    }
}
