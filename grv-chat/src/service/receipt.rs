use tracing::{debug, warn};

use crate::domain::message::{ErrorResponse, ReadReceiptNotification, ReadReceiptRequest};
use crate::error::{Result, SendError, ValidationError};
use crate::registry::Connection;
use crate::server::ChatServer;
use crate::service::delivery::reply;

impl ChatServer {
    /// 处理已读回执：以当前连接身份作为接收方标记已读，再通知在线的原发送方
    /// Handle a read receipt: mark as read with the connection's identity as receiver,
    /// then notify the original senders that are online
    ///
    /// 返回收到通知的发送方数量 / Returns how many senders were notified
    pub async fn process_read_receipt(&self, conn: &Connection, req: ReadReceiptRequest) -> Result<usize> {
        let reader = conn.identity();
        if req.message_ids.is_empty() {
            let err = ValidationError::MissingMessageIds;
            reply(conn, ErrorResponse::from(&err));
            return Err(err.into());
        }
        let ids = req.ids();
        if ids.is_empty() {
            debug!("read receipt from {} carried no usable ids", reader);
            return Ok(0);
        }

        let Some(store) = &self.store else {
            debug!("read receipt from {} ignored: no message store", reader);
            return Ok(0);
        };

        let senders = match self.store_call(store.mark_as_read(reader, &ids)).await {
            Ok(senders) => senders,
            Err(e) => {
                warn!("💾 mark-as-read failed for {}: {}", reader, e);
                reply(
                    conn,
                    ErrorResponse {
                        error: "failed to mark messages as read".to_string(),
                        code: Some("mark_read_failed".to_string()),
                    },
                );
                return Err(e.into());
            }
        };

        let mut notified = 0;
        for receipt in senders {
            let notification = ReadReceiptNotification::new(receipt.message_ids, reader);
            match self.registry.send(&receipt.sender_id, notification) {
                Ok(()) => notified += 1,
                // 离线发送方不排队回执 / receipts are not queued for offline senders
                Err(SendError::NotOnline(_)) => {}
                Err(e) => warn!("read receipt to {} failed: {}", receipt.sender_id, e),
            }
        }
        debug!("👀 {} read {} message(s), {} sender(s) notified", reader, ids.len(), notified);
        Ok(notified)
    }
}
