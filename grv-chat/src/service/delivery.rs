use tracing::{debug, warn};

use crate::domain::message::{AckStatus, Acknowledgement, ChatMessage, ErrorResponse};
use crate::error::{ChatError, Result, SendError, ValidationError};
use crate::registry::Connection;
use crate::server::ChatServer;

impl ChatServer {
    /// 校验消息：内容非空、长度（按字符）、接收方存在且不是自己
    /// Validate: non-empty content, length in characters, receiver present and not self
    pub fn validate_message(&self, msg: &ChatMessage, sender: &str) -> std::result::Result<(), ValidationError> {
        if msg.content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let max = self.config.max_content_chars;
        if msg.content.chars().count() > max {
            return Err(ValidationError::ContentTooLong { max });
        }
        if msg.receiver_id.is_empty() {
            return Err(ValidationError::MissingReceiver);
        }
        if msg.receiver_id == sender {
            return Err(ValidationError::SelfMessage);
        }
        Ok(())
    }

    /// 处理一条消息：校验 -> 规范化 -> 先持久化 -> 投递 -> 回执
    /// Process one message: validate, normalise, persist, deliver, then acknowledge
    ///
    /// 失败时已向发送方推送错误响应或 `error` 回执，返回值仅供调用方记录。
    /// On failure the sender has already received an error response or `error` ack;
    /// the returned error is for the caller's logs.
    pub async fn process_message(&self, conn: &Connection, mut msg: ChatMessage) -> Result<AckStatus> {
        let sender = conn.identity();
        if let Err(e) = self.validate_message(&msg, sender) {
            debug!("rejecting message from {}: {}", sender, e);
            reply(conn, ErrorResponse::from(&e));
            return Err(e.into());
        }

        msg.normalize(sender);

        if let Some(store) = &self.store {
            let saved = self
                .store_call(store.save_message(
                    &msg.sender_id,
                    &msg.receiver_id,
                    &msg.content,
                    msg.message_type,
                    msg.epoch_seconds(),
                ))
                .await;
            match saved {
                Ok(store_id) => msg.store_id = Some(store_id),
                Err(e) => {
                    warn!(
                        "💾 persist failed for {} -> {}: {}",
                        msg.sender_id, msg.receiver_id, e
                    );
                    reply(conn, Acknowledgement::failed(&msg.id, "failed to persist message"));
                    return Err(e.into());
                }
            }
        }

        let message_id = msg.id.clone();
        let store_id = msg.store_id;
        let receiver = msg.receiver_id.clone();
        // 离线不是错误：消息已落库，接收方稍后通过历史拉取
        // Offline is not an error: the message is stored and fetched later via history
        let status = match self.registry.send(&receiver, msg) {
            Ok(()) => AckStatus::Sent,
            Err(SendError::NotOnline(_)) => AckStatus::Queued,
            Err(e) => {
                warn!("📭 delivery to {} failed: {}", receiver, e);
                reply(
                    conn,
                    Acknowledgement::failed(&message_id, format!("failed to deliver message: {}", e)),
                );
                return Err(ChatError::Delivery(e));
            }
        };

        reply(conn, Acknowledgement::delivered(&message_id, status, store_id));
        debug!("📤 {} -> {} {:?}", sender, receiver, status);
        Ok(status)
    }
}

/// 回复来源连接；来源已断开时静默丢弃
/// Reply to the originating connection, dropping silently once it has gone
pub(crate) fn reply(conn: &Connection, event: impl Into<crate::domain::message::OutboundEvent>) {
    if let Err(e) = conn.try_deliver(event) {
        debug!("reply to {} dropped: {}", conn.identity(), e);
    }
}
