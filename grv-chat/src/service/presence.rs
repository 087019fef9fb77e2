use tracing::{debug, warn};

use crate::server::ChatServer;

impl ChatServer {
    /// 更新最后活跃时间（连接建立与断开时调用）；失败只记录日志
    /// Refresh last-active time on connect and disconnect; failures are only logged
    pub async fn touch_presence(&self, identity: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let now = chrono::Utc::now().timestamp();
        match self.store_call(store.update_last_active(identity, now)).await {
            Ok(()) => debug!("presence of {} set to {}", identity, now),
            Err(e) => warn!("failed to update last_active_at for {}: {}", identity, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ChatServer;
    use crate::storage::MemoryMessageStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_touch_presence_records_now() {
        let store = Arc::new(MemoryMessageStore::new());
        let server = ChatServer::default().with_store(store.clone());
        let before = chrono::Utc::now().timestamp();
        server.touch_presence("alice").await;
        let seen = store.last_active("alice").unwrap();
        assert!(seen >= before);
    }

    #[tokio::test]
    async fn test_touch_presence_tolerates_unknown_user() {
        let store = Arc::new(MemoryMessageStore::with_users(["bob"]));
        let server = ChatServer::default().with_store(store.clone());
        server.touch_presence("ghost").await;
        assert_eq!(store.last_active("ghost"), None);
    }
}
