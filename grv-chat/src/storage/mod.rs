//! 存储模块 - 消息存储网关契约与实现
//! Storage Module - message store gateway contract and implementations
//!
//! 核心只依赖 [`MessageStore`] 这一窄契约；内存实现用于开发与测试，
//! PostgreSQL 实现对接市场后端的 `messages` / `users` 表。
//! The core depends only on the narrow [`MessageStore`] contract; the memory
//! backend serves development and tests, the PostgreSQL backend talks to the
//! marketplace `messages` / `users` tables.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;
pub use traits::MessageStore;

use crate::domain::message::MessageKind;

/// 历史分页默认条数 / Default history page size
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// 历史分页上限 / History page size cap
pub const MAX_HISTORY_LIMIT: usize = 100;

// ============================================================================
// 数据结构定义 / Data Structure Definitions
// ============================================================================

/// 持久化消息记录 / Persisted message record
///
/// 同时作为会话历史条目返回 / Also returned as a conversation history item
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageKind,
    pub is_read: bool,
    /// 秒级时间戳 / epoch seconds
    pub messaged_at: i64,
}

/// 一次标记已读中某个原发送方受影响的消息
/// Messages of one original sender that a mark-as-read call actually flipped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderReceipt {
    pub sender_id: String,
    pub message_ids: Vec<String>,
}

/// 将 (发送方, 消息ID) 按发送方首次出现顺序归并
/// Fold (sender, id) rows into distinct senders, keeping first-seen order
pub(crate) fn group_by_sender(rows: impl IntoIterator<Item = (String, i64)>) -> Vec<SenderReceipt> {
    let mut grouped: Vec<SenderReceipt> = Vec::new();
    for (sender_id, id) in rows {
        match grouped.iter_mut().find(|g| g.sender_id == sender_id) {
            Some(group) => group.message_ids.push(id.to_string()),
            None => grouped.push(SenderReceipt {
                sender_id,
                message_ids: vec![id.to_string()],
            }),
        }
    }
    grouped
}

/// 解析数字消息ID，忽略无法解析的 / Parse numeric ids, dropping anything unparsable
pub(crate) fn parse_store_ids(message_ids: &[String]) -> Vec<i64> {
    message_ids
        .iter()
        .filter_map(|id| id.trim().parse::<i64>().ok())
        .collect()
}

/// 规范化分页条数 / Normalise a requested page size
pub fn clamp_history_limit(limit: Option<i64>, default: usize, max: usize) -> usize {
    match limit {
        Some(n) if n > 0 => (n as usize).min(max),
        _ => default.min(max),
    }
}
