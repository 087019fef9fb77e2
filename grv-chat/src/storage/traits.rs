use async_trait::async_trait;

use super::{MessageRecord, SenderReceipt};
use crate::domain::message::MessageKind;
use crate::error::StoreError;

/// 消息存储网关契约，便于替换与测试 / Message store gateway contract, swappable for tests
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 保存消息，返回存储ID / Persist a message and return its store id
    async fn save_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        kind: MessageKind,
        messaged_at: i64,
    ) -> Result<i64, StoreError>;

    /// 更新最后活跃时间（秒）/ Update last-active time (epoch seconds)
    async fn update_last_active(&self, user_id: &str, epoch_seconds: i64) -> Result<(), StoreError>;

    /// 标记已读：仅标记接收方为 `receiver_id` 的未读消息，他人的ID静默忽略；
    /// 返回实际被标记消息的去重发送方
    ///
    /// Mark as read: only unread rows whose receiver is `receiver_id` flip; ids owned
    /// by others are silently ignored. Returns the distinct senders actually affected.
    async fn mark_as_read(
        &self,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<Vec<SenderReceipt>, StoreError>;

    /// 会话历史：`{user_id, peer_id}` 无序对、严格早于 `before_epoch` 的最新 `limit` 条，按时间升序
    /// History for the unordered pair: the newest `limit` records strictly before
    /// `before_epoch`, returned oldest-first
    async fn get_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
        before_epoch: i64,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    /// 后端名称（健康检查展示）/ Backend name shown by health checks
    fn backend(&self) -> &'static str;
}
