use async_trait::async_trait;
use grv::{HealthCheck, HealthStatus};

use crate::server::ChatServer;

// 为私信服务实现统一健康检查接口
// Implement unified HealthCheck for the chat service
#[async_trait]
impl HealthCheck for ChatServer {
    /// 在线连接数与存储后端 / Online connections and store backend
    async fn check_health(&self) -> HealthStatus {
        let online_count = self.registry.len();
        HealthStatus {
            component: "chat_server".to_string(),
            healthy: true,
            message: Some(format!(
                "online={} store={}",
                online_count,
                self.store_backend()
            )),
            timestamp: chrono::Utc::now(),
        }
    }
}
