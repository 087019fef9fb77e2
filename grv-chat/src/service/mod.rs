//! 业务服务：投递、已读回执、历史与在线、心跳活跃、健康检查
//! Services: delivery, read receipts, history and presence, health

pub mod delivery;
pub mod health;
pub mod history;
pub mod presence;
pub mod receipt;

use std::future::Future;

use crate::error::StoreError;
use crate::server::ChatServer;

impl ChatServer {
    /// 存储调用统一超时，卡住的调用不会占住任务
    /// Bound a store call so a stuck backend cannot pin the task
    pub(crate) async fn store_call<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let limit = self.config.store_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit.as_millis() as u64)),
        }
    }
}
