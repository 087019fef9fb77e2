use std::sync::Arc;

use crate::config::ChatConfig;
use crate::registry::ConnectionRegistry;
use crate::storage::MessageStore;

/// 服务端全局状态 / Server global state
///
/// 各能力以 `impl ChatServer` 分散在 `service` 与 `ws` 模块中。
/// Capabilities are spread across `service` and `ws` as `impl ChatServer` blocks.
#[derive(Clone)]
pub struct ChatServer {
    pub registry: Arc<ConnectionRegistry>, // 在线连接 / Live connections
    pub store: Option<Arc<dyn MessageStore>>, // 消息存储（可选）/ Message store (optional)
    pub config: Arc<ChatConfig>,           // 管道参数 / Pipeline tunables
}

impl ChatServer {
    /// 构建无存储的服务器实例 / Build a server with no store attached
    pub fn new(config: ChatConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.outbound_capacity));
        Self {
            registry,
            store: None,
            config: Arc::new(config),
        }
    }

    /// 挂载消息存储 / Attach a message store
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.as_ref().map(|s| s.backend()).unwrap_or("none")
    }
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new(ChatConfig::default())
    }
}
