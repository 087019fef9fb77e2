use serde::Deserialize;
use tracing::warn;

use crate::domain::message::OnlineSnapshot;
use crate::error::{ChatError, Result, ValidationError};
use crate::server::ChatServer;
use crate::storage::{clamp_history_limit, MessageRecord};

/// 历史查询参数 / History query
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub peer_id: String,
    pub limit: Option<i64>,
    /// 秒级游标，缺省为当前时间 / Epoch-seconds cursor, defaults to now
    pub before: Option<i64>,
}

impl ChatServer {
    /// 会话历史（最新一页，按时间升序）；请求身份必须与已认证身份一致
    /// Conversation history page, oldest-first; the claimed identity must match the
    /// authenticated one
    pub async fn get_history(&self, authenticated: &str, query: &HistoryQuery) -> Result<Vec<MessageRecord>> {
        if query.user_id != authenticated {
            return Err(ChatError::AuthorizationMismatch {
                claimed: query.user_id.clone(),
                authenticated: authenticated.to_string(),
            });
        }
        if query.peer_id.is_empty() {
            return Err(ValidationError::MissingPeer.into());
        }
        let store = self.store.as_ref().ok_or(ChatError::StoreUnavailable)?;

        let limit = clamp_history_limit(
            query.limit,
            self.config.history_default_limit,
            self.config.history_max_limit,
        );
        let before = query.before.unwrap_or_else(|| chrono::Utc::now().timestamp());
        self.store_call(store.get_history(&query.user_id, &query.peer_id, limit, before))
            .await
            .map_err(|e| {
                warn!(
                    "failed to fetch messages for {} <-> {}: {}",
                    query.user_id, query.peer_id, e
                );
                ChatError::Persistence(e)
            })
    }

    /// 在线快照 / Online snapshot, straight from the registry
    pub fn online_snapshot(&self) -> OnlineSnapshot {
        let online_users = self.registry.list_online();
        let count = online_users.len();
        OnlineSnapshot { online_users, count }
    }
}
