use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{group_by_sender, parse_store_ids, MessageRecord, MessageStore, SenderReceipt};
use crate::domain::message::MessageKind;
use crate::error::StoreError;

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    records: Vec<MessageRecord>,
    last_active: HashMap<String, i64>,
}

/// 内存消息存储：与 SQL 实现语义一致 / In-memory store with the same semantics as SQL
///
/// 默认接受任意用户；`with_users` 限定已知用户集合以模拟外键约束。
/// Accepts any user by default; `with_users` restricts to a known set like the FK join does.
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: Mutex<MemoryInner>,
    known_users: Option<HashSet<String>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            known_users: Some(users.into_iter().map(Into::into).collect()),
        }
    }

    fn check_user(&self, user_id: &str) -> Result<(), StoreError> {
        match &self.known_users {
            Some(users) if !users.contains(user_id) => {
                Err(StoreError::UnknownUser(user_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn last_active(&self, user_id: &str) -> Option<i64> {
        self.inner.lock().last_active.get(user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全部记录快照 / Snapshot of every record
    pub fn records(&self) -> Vec<MessageRecord> {
        self.inner.lock().records.clone()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        kind: MessageKind,
        messaged_at: i64,
    ) -> Result<i64, StoreError> {
        self.check_user(sender_id)?;
        self.check_user(receiver_id)?;
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(MessageRecord {
            id,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            message_type: kind,
            is_read: false,
            messaged_at,
        });
        Ok(id)
    }

    async fn update_last_active(&self, user_id: &str, epoch_seconds: i64) -> Result<(), StoreError> {
        self.check_user(user_id)?;
        self.inner
            .lock()
            .last_active
            .insert(user_id.to_string(), epoch_seconds);
        Ok(())
    }

    async fn mark_as_read(
        &self,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<Vec<SenderReceipt>, StoreError> {
        let ids = parse_store_ids(message_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.lock();
        let mut flipped = Vec::new();
        for record in inner.records.iter_mut() {
            if record.receiver_id == receiver_id && !record.is_read && ids.contains(&record.id) {
                record.is_read = true;
                flipped.push((record.sender_id.clone(), record.id));
            }
        }
        Ok(group_by_sender(flipped))
    }

    async fn get_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
        before_epoch: i64,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut page: Vec<MessageRecord> = inner
            .records
            .iter()
            .filter(|r| {
                ((r.sender_id == user_id && r.receiver_id == peer_id)
                    || (r.sender_id == peer_id && r.receiver_id == user_id))
                    && r.messaged_at < before_epoch
            })
            .cloned()
            .collect();
        // 取最新的 limit 条，再按时间升序返回 / newest `limit`, then oldest-first
        page.sort_by_key(|r| (r.messaged_at, r.id));
        let skip = page.len().saturating_sub(limit);
        Ok(page.split_off(skip))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(store: &MemoryMessageStore, sender: &str, receiver: &str, content: &str, at: i64) -> i64 {
        store
            .save_message(sender, receiver, content, MessageKind::Text, at)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_history_bidirectional_and_ordered() {
        let store = MemoryMessageStore::new();
        seed(&store, "a", "b", "m1", 100).await;
        seed(&store, "b", "a", "m2", 200).await;
        seed(&store, "a", "c", "other pair", 250).await;
        seed(&store, "a", "b", "m3", 300).await;

        let history = store.get_history("a", "b", 10, 1_000).await.unwrap();
        let contents: Vec<_> = history.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2", "m3"]);
        assert_eq!(store.get_history("b", "a", 10, 1_000).await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_history_before_is_strict() {
        let store = MemoryMessageStore::new();
        seed(&store, "a", "b", "old", 100).await;
        seed(&store, "a", "b", "mid", 200).await;
        seed(&store, "a", "b", "new", 300).await;

        let history = store.get_history("a", "b", 10, 250).await.unwrap();
        let contents: Vec<_> = history.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["old", "mid"]);
        assert!(store.get_history("a", "b", 10, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backward_pagination_has_no_gap_or_overlap() {
        let store = MemoryMessageStore::new();
        for i in 1..=25 {
            seed(&store, if i % 2 == 0 { "a" } else { "b" }, if i % 2 == 0 { "b" } else { "a" }, &format!("m{}", i), i * 10).await;
        }

        let mut before = i64::MAX;
        let mut seen = Vec::new();
        loop {
            let page = store.get_history("a", "b", 10, before).await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 10);
            assert!(page.windows(2).all(|w| w[0].messaged_at < w[1].messaged_at));
            before = page[0].messaged_at;
            let mut contents: Vec<i64> = page.iter().map(|r| r.messaged_at).collect();
            contents.extend(seen);
            seen = contents;
        }
        let expected: Vec<i64> = (1..=25).map(|i| i * 10).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_mark_as_read_only_by_receiver() {
        let store = MemoryMessageStore::new();
        let id1 = seed(&store, "sender", "receiver", "hello", 123).await;
        let id2 = seed(&store, "sender", "receiver", "hello2", 124).await;
        let ids = vec![id1.to_string(), id2.to_string()];

        let updated = store.mark_as_read("other", &ids).await.unwrap();
        assert!(updated.is_empty());
        assert!(store.records().iter().all(|r| !r.is_read));

        let updated = store.mark_as_read("receiver", &ids).await.unwrap();
        assert_eq!(
            updated,
            vec![SenderReceipt {
                sender_id: "sender".into(),
                message_ids: ids.clone()
            }]
        );
        assert!(store.records().iter().all(|r| r.is_read));

        // 已读的不会再次返回 / already-read rows are not reported again
        assert!(store.mark_as_read("receiver", &ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_as_read_ignores_non_numeric_ids() {
        let store = MemoryMessageStore::new();
        seed(&store, "s", "r", "x", 1).await;
        let updated = store
            .mark_as_read("r", &["not-a-number".to_string()])
            .await
            .unwrap();
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn test_known_users_enforced() {
        let store = MemoryMessageStore::with_users(["a", "b"]);
        assert!(store
            .save_message("a", "b", "ok", MessageKind::Text, 1)
            .await
            .is_ok());
        assert!(matches!(
            store.save_message("a", "zed", "no", MessageKind::Text, 1).await,
            Err(StoreError::UnknownUser(u)) if u == "zed"
        ));
        assert!(store.update_last_active("zed", 5).await.is_err());
    }

    #[tokio::test]
    async fn test_update_last_active_overwrites() {
        let store = MemoryMessageStore::new();
        store.update_last_active("u", 100).await.unwrap();
        store.update_last_active("u", 200).await.unwrap();
        assert_eq!(store.last_active("u"), Some(200));
    }
}
